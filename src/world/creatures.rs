use crate::mechanics::conditions::ConditionType;
use crate::pathfinding::walk_plan::WalkPlan;
use crate::scheduling::exhaustion::ExhaustionLedger;
use crate::world::items::ItemTypeId;
use crate::world::monsters::{BloodType, MonsterType};
use crate::world::position::{Direction, Position};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CreatureId(pub u32);

impl CreatureId {
    /// Requestor id used for work the server itself initiates.
    pub const SYSTEM: CreatureId = CreatureId(0);

    pub fn is_system(self) -> bool {
        self == Self::SYSTEM
    }
}

impl fmt::Display for CreatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CreatureKind {
    Player,
    Npc,
    Monster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaseMode {
    Stand,
    Chase,
    KeepDistance,
}

pub const DEFAULT_GROUND_SPEED: u16 = 150;
pub const MAX_CREATURE_SPEED: u16 = 1500;

/// Creatures that are fighting this one.
///
/// Touched both from operations and from visibility callbacks, so every
/// access goes through the lock.
#[derive(Debug, Default)]
pub struct HostileCombatants {
    inner: Mutex<Vec<CreatureId>>,
}

impl HostileCombatants {
    /// Returns true when `id` is the first hostile, i.e. the creature just entered a fight.
    pub fn add(&self, id: CreatureId) -> bool {
        let mut hostiles = self.lock();
        if hostiles.contains(&id) {
            return false;
        }
        hostiles.push(id);
        hostiles.len() == 1
    }

    /// Removes `id` and returns the next hostile in line, if any.
    pub fn remove(&self, id: CreatureId) -> Option<CreatureId> {
        let mut hostiles = self.lock();
        hostiles.retain(|existing| *existing != id);
        hostiles.first().copied()
    }

    pub fn contains(&self, id: CreatureId) -> bool {
        self.lock().contains(&id)
    }

    pub fn first(&self) -> Option<CreatureId> {
        self.lock().first().copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CreatureId>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
pub struct Creature {
    pub id: CreatureId,
    pub name: String,
    pub kind: CreatureKind,
    pub race: Option<String>,
    pub position: Position,
    pub direction: Direction,
    pub speed: u16,
    pub health: u32,
    pub max_health: u32,
    pub experience: u64,
    pub experience_yield: u32,
    pub corpse: ItemTypeId,
    pub blood: BloodType,
    pub chase_mode: ChaseMode,
    pub attack_target: Option<CreatureId>,
    pub attack_speed: f32,
    pub defense_speed: f32,
    pub walk_plan: Option<WalkPlan>,
    pub exhaustion: ExhaustionLedger,
    pub conditions: BTreeSet<ConditionType>,
    pub hostiles: HostileCombatants,
    pub damage_taken: Vec<(CreatureId, u32)>,
    /// Extra weight on the next step, set after a forced random step.
    pub last_movement_cost_modifier: u32,
}

impl Creature {
    pub fn new(id: CreatureId, name: &str, kind: CreatureKind, position: Position) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            race: None,
            position,
            direction: Direction::South,
            speed: 220,
            health: 100,
            max_health: 100,
            experience: 0,
            experience_yield: 0,
            corpse: ItemTypeId(0),
            blood: BloodType::Blood,
            chase_mode: ChaseMode::Stand,
            attack_target: None,
            attack_speed: 1.0,
            defense_speed: 1.0,
            walk_plan: None,
            exhaustion: ExhaustionLedger::new(),
            conditions: BTreeSet::new(),
            hostiles: HostileCombatants::default(),
            damage_taken: Vec::new(),
            last_movement_cost_modifier: 1,
        }
    }

    pub fn player(id: CreatureId, name: &str, position: Position) -> Self {
        Self::new(id, name, CreatureKind::Player, position)
    }

    pub fn monster(id: CreatureId, monster_type: &MonsterType, position: Position) -> Self {
        let mut creature = Self::new(id, &monster_type.name, CreatureKind::Monster, position);
        creature.race = Some(monster_type.race.clone());
        creature.speed = monster_type.speed();
        creature.health = monster_type.health;
        creature.max_health = monster_type.health;
        creature.experience_yield = monster_type.experience;
        creature.corpse = monster_type.corpse;
        creature.blood = monster_type.blood;
        creature.chase_mode = if monster_type.keeps_distance {
            ChaseMode::KeepDistance
        } else {
            ChaseMode::Chase
        };
        creature
    }

    pub fn is_player(&self) -> bool {
        self.kind == CreatureKind::Player
    }

    pub fn is_monster(&self) -> bool {
        self.kind == CreatureKind::Monster
    }

    pub fn is_dead(&self) -> bool {
        self.health == 0
    }

    pub fn can_walk(&self) -> bool {
        self.speed > 0
    }

    pub fn health_percent(&self) -> u8 {
        if self.max_health == 0 {
            return 0;
        }
        ((u64::from(self.health) * 100) / u64::from(self.max_health)).min(100) as u8
    }

    /// Time one step onto ground of `ground_speed` takes this creature.
    pub fn step_duration(&self, ground_speed: u16, direction: Direction) -> Duration {
        let mut ground_speed = u64::from(ground_speed.max(1));
        if direction.is_diagonal() {
            ground_speed = ground_speed.saturating_mul(3);
        }
        ground_speed = ground_speed.saturating_mul(u64::from(self.last_movement_cost_modifier.max(1)));
        let creature_speed = u64::from(self.speed.max(1));
        let raw_ms = ground_speed.saturating_mul(1000) / creature_speed;
        Duration::from_millis(raw_ms.max(1))
    }

    pub fn move_to(&mut self, position: Position) {
        if let Some(direction) = self.position.direction_to(position) {
            self.direction = direction;
        }
        self.position = position;
    }

    pub fn record_damage(&mut self, from: CreatureId, amount: u32) {
        match self.damage_taken.iter_mut().find(|(id, _)| *id == from) {
            Some(entry) => entry.1 = entry.1.saturating_add(amount),
            None => self.damage_taken.push((from, amount)),
        }
    }

    pub fn add_experience(&mut self, amount: u64) {
        self.experience = self.experience.saturating_add(amount);
    }

    /// Registers a hostile; the first one becomes the attack target.
    pub fn add_hostile(&mut self, other: CreatureId) {
        if other == self.id {
            return;
        }
        if self.hostiles.add(other) {
            self.attack_target = Some(other);
        }
    }

    pub fn remove_hostile(&mut self, other: CreatureId) {
        let next = self.hostiles.remove(other);
        if self.attack_target == Some(other) {
            self.attack_target = next;
        }
    }
}

/// Read access to live creatures, as the rest of the server exposes it.
pub trait CreatureFinder {
    fn find_creature(&self, id: CreatureId) -> Option<&Creature>;

    fn creatures(&self) -> Box<dyn Iterator<Item = &Creature> + '_>;

    fn creature_at(&self, position: Position) -> Option<&Creature> {
        self.creatures()
            .find(|creature| creature.position == position && !creature.is_dead())
    }
}

pub trait CreatureManager: CreatureFinder {
    fn find_creature_mut(&mut self, id: CreatureId) -> Option<&mut Creature>;

    fn add_creature(&mut self, creature: Creature);

    fn remove_creature(&mut self, id: CreatureId) -> Option<Creature>;

    fn next_creature_id(&mut self) -> CreatureId;

    fn creature_ids(&self) -> Vec<CreatureId>;
}

#[derive(Debug)]
pub struct CreatureRegistry {
    creatures: HashMap<CreatureId, Creature>,
    next_id: u32,
}

/// Monster ids start above the range reserved for player characters.
const FIRST_SPAWNED_ID: u32 = 0x4000_0000;

impl CreatureRegistry {
    pub fn new() -> Self {
        Self {
            creatures: HashMap::new(),
            next_id: FIRST_SPAWNED_ID,
        }
    }

    pub fn len(&self) -> usize {
        self.creatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creatures.is_empty()
    }
}

impl Default for CreatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CreatureFinder for CreatureRegistry {
    fn find_creature(&self, id: CreatureId) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    fn creatures(&self) -> Box<dyn Iterator<Item = &Creature> + '_> {
        Box::new(self.creatures.values())
    }
}

impl CreatureManager for CreatureRegistry {
    fn find_creature_mut(&mut self, id: CreatureId) -> Option<&mut Creature> {
        self.creatures.get_mut(&id)
    }

    fn add_creature(&mut self, creature: Creature) {
        self.creatures.insert(creature.id, creature);
    }

    fn remove_creature(&mut self, id: CreatureId) -> Option<Creature> {
        self.creatures.remove(&id)
    }

    fn next_creature_id(&mut self) -> CreatureId {
        loop {
            let id = CreatureId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1).max(FIRST_SPAWNED_ID);
            if !self.creatures.contains_key(&id) {
                return id;
            }
        }
    }

    fn creature_ids(&self) -> Vec<CreatureId> {
        let mut ids: Vec<CreatureId> = self.creatures.keys().copied().collect();
        ids.sort();
        ids
    }
}
