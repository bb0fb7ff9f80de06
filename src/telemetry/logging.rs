use crate::error::TelemetryError;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const GAME_LOG: &str = "game.log";

static INSTALLED: OnceLock<PathBuf> = OnceLock::new();

const HEADER_LINE: &str = "-------------------------------------------------------------------------------";
const HEADER_TITLE: &str = "Tibia - Graphical Multi-User-Dungeon";

const WEEKDAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Installs the global subscriber: everything at `level` and above goes to
/// `<root>/log/game.log`, warnings and errors also go to stderr. `RUST_LOG`
/// wins over `level` when set. Calling it again is a no-op.
pub fn init(root: &Path, level: &str) -> Result<(), TelemetryError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|_| TelemetryError::Filter(level.to_string()))?,
    };
    let (path, file) = open_game_log(root)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_timer(GameLogTime)
        .with_writer(Mutex::new(file))
        .with_filter(filter);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_timer(GameLogTime)
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::WARN);
    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInstalled)?;

    let _ = INSTALLED.set(path);
    Ok(())
}

/// Opens `<root>/log/game.log` for appending, writing the banner into a fresh file.
pub fn open_game_log(root: &Path) -> Result<(PathBuf, File), TelemetryError> {
    let log_dir = root.join("log");
    std::fs::create_dir_all(&log_dir).map_err(|source| TelemetryError::LogDirectory {
        path: log_dir.clone(),
        source,
    })?;
    let path = log_dir.join(GAME_LOG);
    let log_file_error = |source| TelemetryError::LogFile {
        path: path.clone(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(log_file_error)?;
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        write_header(&mut file, GAME_LOG).map_err(log_file_error)?;
    }
    Ok((path, file))
}

struct GameLogTime;

impl FormatTime for GameLogTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", format_timestamp(unix_timestamp()))
    }
}

fn write_header(file: &mut File, name: &str) -> std::io::Result<()> {
    let timestamp = format_header_timestamp(unix_timestamp());
    writeln!(file, "{HEADER_LINE}")?;
    writeln!(file, "{HEADER_TITLE}")?;
    writeln!(file, "{name} - gestartet {timestamp}")?;
    file.flush()
}

fn format_header_timestamp(ts: i64) -> String {
    let datetime = breakdown_timestamp(ts);
    let weekday = WEEKDAYS[(datetime.weekday as usize).min(6)];
    let month = MONTHS[(datetime.month as usize).saturating_sub(1).min(11)];
    format!(
        "{weekday} {month} {:>2} {:02}:{:02}:{:02} {}",
        datetime.day, datetime.hour, datetime.minute, datetime.second, datetime.year
    )
}

fn format_timestamp(ts: i64) -> String {
    let datetime = breakdown_timestamp(ts);
    format!(
        "{:02}.{:02}.{} {:02}:{:02}:{:02}",
        datetime.day, datetime.month, datetime.year, datetime.hour, datetime.minute, datetime.second
    )
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct DateTimeParts {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    weekday: u32,
}

fn breakdown_timestamp(ts: i64) -> DateTimeParts {
    let secs = ts.max(0);
    let days = secs / 86_400;
    let seconds_of_day = (secs % 86_400) as u32;
    let (year, month, day) = civil_from_days(days);
    DateTimeParts {
        year,
        month,
        day,
        hour: seconds_of_day / 3_600,
        minute: (seconds_of_day % 3_600) / 60,
        second: seconds_of_day % 60,
        weekday: (days % 7) as u32,
    }
}

// Days since 1970-01-01 to (year, month, day) in the proleptic Gregorian calendar.
fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = (yoe + era * 400 + if month <= 2 { 1 } else { 0 }) as i32;
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_use_the_game_log_layout() {
        // 2024-02-29 13:05:09 UTC, a Thursday.
        let ts = 1_709_211_909;
        assert_eq!(format_timestamp(ts), "29.02.2024 13:05:09");
        assert_eq!(format_header_timestamp(ts), "Thu Feb 29 13:05:09 2024");
        assert_eq!(format_header_timestamp(0), "Thu Jan  1 00:00:00 1970");
    }

    #[test]
    fn banner_is_written_once_per_file() {
        let root = std::env::temp_dir().join(format!("tibia-mechanics-log-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);

        let (path, mut file) = open_game_log(&root).expect("first open");
        writeln!(file, "line").expect("write");
        drop(file);
        let (_, file) = open_game_log(&root).expect("second open");
        drop(file);

        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents.matches(HEADER_TITLE).count(), 1);
        assert!(contents.starts_with(HEADER_LINE));
        assert!(contents.contains("game.log - gestartet "));
        assert!(contents.ends_with("line\n"));
        let _ = std::fs::remove_dir_all(&root);
    }
}
