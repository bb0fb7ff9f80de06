use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Milliseconds on the scheduler timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GameTick(pub u64);

impl GameTick {
    pub const ZERO: GameTick = GameTick(0);

    pub fn after(self, duration: Duration) -> GameTick {
        GameTick(self.0.saturating_add(millis(duration)))
    }

    /// Time left until `self`, zero once `now` has passed it.
    pub fn remaining_from(self, now: GameTick) -> Duration {
        Duration::from_millis(self.0.saturating_sub(now.0))
    }
}

impl fmt::Display for GameTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

pub fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Source of the scheduler's notion of "now". Never wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> GameTick;
}

#[derive(Debug)]
pub struct MonotonicClock {
    started: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> GameTick {
        GameTick(millis(self.started.elapsed()))
    }
}

/// Clock that only moves when told to. Used for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: GameTick) -> Self {
        Self {
            now: AtomicU64::new(start.0),
        }
    }

    pub fn advance(&self, duration: Duration) -> GameTick {
        let step = millis(duration);
        let previous = self.now.fetch_add(step, Ordering::SeqCst);
        GameTick(previous.saturating_add(step))
    }

    pub fn set(&self, tick: GameTick) {
        self.now.store(tick.0, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> GameTick {
        GameTick(self.now.load(Ordering::SeqCst))
    }
}
