use crate::world::creatures::CreatureId;
use crate::world::position::Position;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("usage: tibia-mechanics <root> [config-file]")]
    Usage,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value {value:?} for {name}")]
    InvalidOverride { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("log directory {path} could not be created: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("log file {path} could not be opened: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid log filter {0:?}")]
    Filter(String),
    #[error("another tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Why an event body gave up. The runner logs it and discards the event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("creature {0} does not exist")]
    CreatureNotFound(CreatureId),
    #[error("no tile at {0}")]
    TileNotFound(Position),
    #[error("{from} is not next to {to}")]
    NotAdjacent { from: Position, to: Position },
    #[error("{0}")]
    Invariant(String),
}

/// Malformed client request. Logged and dropped; never reaches the scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("creature {0} is not a player")]
    NotAPlayer(CreatureId),
    #[error("creature {0} cannot be followed")]
    UnknownTarget(CreatureId),
    #[error("walk request without directions")]
    EmptyWalk,
    #[error("walk request with {0} steps exceeds the limit")]
    WalkTooLong(usize),
    #[error("empty speech")]
    EmptySpeech,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("simulation thread panicked")]
    SimulationPanicked,
}
