use crate::world::creatures::CreatureId;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_KNOWN_CREATURE_LIMIT: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Familiarity {
    /// The client already has this creature; a short update is enough.
    Known,
    /// First sighting. `evicted` is the creature dropped to make room, if any.
    Learned { evicted: Option<CreatureId> },
}

/// Creatures each connected client has already been sent in full.
///
/// Visibility callbacks and notification preparation both touch these sets,
/// so they live behind one lock.
#[derive(Debug)]
pub struct KnownCreatureSets {
    limit: NonZeroUsize,
    clients: Mutex<HashMap<CreatureId, LruCache<CreatureId, ()>>>,
}

impl Default for KnownCreatureSets {
    fn default() -> Self {
        Self::new(DEFAULT_KNOWN_CREATURE_LIMIT)
    }
}

impl KnownCreatureSets {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: NonZeroUsize::new(limit).unwrap_or(NonZeroUsize::MIN),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, player: CreatureId) {
        let limit = self.limit;
        self.lock()
            .entry(player)
            .or_insert_with(|| LruCache::new(limit));
    }

    pub fn knows(&self, player: CreatureId, creature: CreatureId) -> bool {
        self.lock()
            .get(&player)
            .map(|known| known.contains(&creature))
            .unwrap_or(false)
    }

    /// Records that `player` has now seen `creature`.
    pub fn learn(&self, player: CreatureId, creature: CreatureId) -> Familiarity {
        let limit = self.limit;
        let mut clients = self.lock();
        let known = clients
            .entry(player)
            .or_insert_with(|| LruCache::new(limit));
        if known.get(&creature).is_some() {
            return Familiarity::Known;
        }
        let evicted = known.push(creature, ()).map(|(evicted, _)| evicted);
        Familiarity::Learned { evicted }
    }

    pub fn forget(&self, player: CreatureId, creature: CreatureId) -> bool {
        self.lock()
            .get_mut(&player)
            .and_then(|known| known.pop(&creature))
            .is_some()
    }

    /// A creature left the game: nobody knows it any more, and if it was a
    /// client its own set goes too.
    pub fn depart(&self, creature: CreatureId) {
        let mut clients = self.lock();
        clients.remove(&creature);
        for known in clients.values_mut() {
            known.pop(&creature);
        }
    }

    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    pub fn known_count(&self, player: CreatureId) -> usize {
        self.lock().get(&player).map(|known| known.len()).unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CreatureId, LruCache<CreatureId, ()>>> {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
