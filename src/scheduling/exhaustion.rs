use crate::world::time::GameTick;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExhaustionCategory {
    Movement,
    Combat,
    Speech,
    Spell,
    Use,
}

/// Cooldown an operation charges its requestor once it has executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExhaustionCost {
    entries: Vec<(ExhaustionCategory, Duration)>,
}

impl ExhaustionCost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(category: ExhaustionCategory, duration: Duration) -> Self {
        let mut cost = Self::new();
        cost.set(category, duration);
        cost
    }

    pub fn set(&mut self, category: ExhaustionCategory, duration: Duration) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == category) {
            Some(entry) => entry.1 = duration,
            None => self.entries.push((category, duration)),
        }
    }

    pub fn get(&self, category: ExhaustionCategory) -> Option<Duration> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == category)
            .map(|(_, duration)| *duration)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExhaustionCategory, Duration)> + '_ {
        self.entries.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-creature record of when each category of action is next allowed.
#[derive(Debug, Clone, Default)]
pub struct ExhaustionLedger {
    ready_at: HashMap<ExhaustionCategory, GameTick>,
}

impl ExhaustionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready_at(&self, category: ExhaustionCategory) -> Option<GameTick> {
        self.ready_at.get(&category).copied()
    }

    pub fn is_ready(&self, category: ExhaustionCategory, now: GameTick) -> bool {
        self.remaining(category, now).is_zero()
    }

    pub fn remaining(&self, category: ExhaustionCategory, now: GameTick) -> Duration {
        self.ready_at
            .get(&category)
            .map(|ready_at| ready_at.remaining_from(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Stacks on top of outstanding debt so back-to-back actions queue up.
    pub fn add(&mut self, category: ExhaustionCategory, now: GameTick, duration: Duration) {
        let base = self.ready_at(category).map_or(now, |ready_at| ready_at.max(now));
        self.ready_at.insert(category, base.after(duration));
    }

    pub fn charge(&mut self, cost: &ExhaustionCost, now: GameTick) {
        for (category, duration) in cost.iter() {
            if !duration.is_zero() {
                self.add(category, now, duration);
            }
        }
    }

    pub fn clear_expired(&mut self, now: GameTick) {
        self.ready_at.retain(|_, ready_at| *ready_at > now);
    }
}
