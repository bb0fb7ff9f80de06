pub mod config;
pub mod error;
pub mod mechanics;
pub mod notifications;
pub mod pathfinding;
pub mod scheduling;
pub mod telemetry;
pub mod world;

pub use error::Error;

use config::SimulationConfig;
use mechanics::operations::SpawnMonstersOperation;
use notifications::{KnownCreatureSets, TranscriptSink};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scheduling::{EventRunner, ScheduledEvent, Scheduler, SimulationControl};
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use world::creatures::CreatureId;
use world::items::{ItemCatalog, ItemTypeId};
use world::map::Map;
use world::monsters::{MonsterTypeCatalog, BLOOD_POOL, SLIME_POOL};
use world::time::MonotonicClock;

pub const OUTBOUND_TRANSCRIPT: &str = "outbound.yaml";

pub fn run(args: &[String]) -> Result<(), Error> {
    let config = config::AppConfig::from_args(args)?;
    telemetry::logging::init(&config.root, &config.simulation.log_level)?;
    info!(
        root = %config.root.display(),
        config = %config.config_path.display(),
        "tibia-mechanics starting"
    );

    let mut runner = build_runner(&config.root, &config.simulation)?;
    let simulation = &config.simulation;
    for spawn in &simulation.spawns {
        runner.scheduler().schedule(
            ScheduledEvent::operation(CreatureId::SYSTEM, SpawnMonstersOperation::new(spawn.clone())),
            Duration::ZERO,
        );
    }
    info!(
        tiles = runner.map().tile_count(),
        spawns = simulation.spawns.len(),
        monster_types = simulation.monster_types.len(),
        "world ready"
    );

    let control = Arc::new(SimulationControl::new());
    let run_for = simulation.run_for();
    let idle_wait = simulation.idle_wait();
    let simulation_control = Arc::clone(&control);
    let handle = std::thread::spawn(move || runner.run(&simulation_control, run_for, idle_wait));
    let summary = handle.join().map_err(|_| Error::SimulationPanicked)?;
    info!(
        executed = summary.executed,
        skipped = summary.skipped,
        failed = summary.failed,
        "tibia-mechanics stopped"
    );
    Ok(())
}

/// Assembles the event runner for a configured world, with a monotonic clock.
pub fn build_runner(root: &Path, simulation: &SimulationConfig) -> Result<EventRunner, Error> {
    let scheduler = Arc::new(Scheduler::new(Arc::new(MonotonicClock::new())));

    let map_config = &simulation.map;
    let mut map = Map::open_floor(
        &map_config.name,
        map_config.width,
        map_config.height,
        map_config.floor,
        map_config.ground_speed,
    );
    for position in &map_config.blocked {
        map.block(*position);
    }

    let mut items = ItemCatalog::new()
        .with_type(BLOOD_POOL, "pool of blood")
        .with_type(SLIME_POOL, "pool of slime");
    for monster_type in &simulation.monster_types {
        items = items.with_type(monster_type.corpse, &format!("dead {}", monster_type.name.to_lowercase()));
    }
    for item_type in &simulation.item_types {
        items = items.with_type(ItemTypeId(item_type.id), &item_type.name);
    }

    let log_dir = root.join("log");
    std::fs::create_dir_all(&log_dir).map_err(|source| error::TelemetryError::LogDirectory {
        path: log_dir.clone(),
        source,
    })?;
    let transcript_path = log_dir.join(OUTBOUND_TRANSCRIPT);
    let transcript = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&transcript_path)
        .map_err(|source| error::TelemetryError::LogFile {
            path: transcript_path.clone(),
            source,
        })?;
    let transcript_clock = Arc::clone(&scheduler);
    let sink = TranscriptSink::new(BufWriter::new(transcript), move || transcript_clock.current_time());

    let rng = match simulation.rng_seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => {
            warn!("no rng seed configured, runs will not be reproducible");
            ChaCha8Rng::from_entropy()
        }
    };

    Ok(EventRunner::new(
        scheduler,
        map,
        simulation.mechanics_settings(),
        Arc::new(sink),
        rng,
    )
    .with_items(items)
    .with_monster_types(MonsterTypeCatalog::from_types(simulation.monster_types.iter().cloned()))
    .with_known_creatures(Arc::new(KnownCreatureSets::new(simulation.known_creature_limit))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_spawns_populate_the_world() {
        let root = std::env::temp_dir().join(format!("tibia-mechanics-run-test-{}", std::process::id()));
        let simulation = SimulationConfig::parse(
            r#"
rng_seed: 3
map: { width: 32, height: 32 }
monster_types:
  - { race: rat, name: Rat, base_speed: 10, corpse: 2813 }
spawns:
  - { race: rat, location: { x: 16, y: 16, z: 7 }, radius: 8, count: 2 }
"#,
        )
        .expect("config");
        let mut runner = build_runner(&root, &simulation).expect("runner");
        for spawn in &simulation.spawns {
            runner.scheduler().schedule(
                ScheduledEvent::operation(CreatureId::SYSTEM, SpawnMonstersOperation::new(spawn.clone())),
                Duration::ZERO,
            );
        }

        let report = runner.run_due();
        assert!(report.failures.is_empty());
        let rats = runner.creatures().len();
        assert!((1..=2).contains(&rats), "{rats} rats placed");
        assert!(root.join("log").join(OUTBOUND_TRANSCRIPT).is_file());
        let _ = std::fs::remove_dir_all(&root);
    }
}
