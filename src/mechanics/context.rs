use crate::notifications::Notification;
use crate::pathfinding::{PathFinder, PathOutcome, PathRequest};
use crate::scheduling::event::{EventId, Operation, ScheduledEvent};
use crate::scheduling::exhaustion::ExhaustionCategory;
use crate::scheduling::scheduler::Scheduler;
use crate::world::creatures::{CreatureId, CreatureManager};
use crate::world::items::ItemFactory;
use crate::world::map::SpatialMap;
use crate::world::monsters::MonsterTypeRepository;
use crate::world::time::GameTick;
use rand::RngCore;
use std::time::Duration;

/// Tunables operations read while they run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MechanicsSettings {
    pub walk_wait_time: Duration,
    pub in_fight_duration: Duration,
    pub default_max_steps: u32,
}

impl Default for MechanicsSettings {
    fn default() -> Self {
        Self {
            walk_wait_time: crate::pathfinding::walk_plan::DEFAULT_WAIT_TIME,
            in_fight_duration: Duration::from_secs(60),
            default_max_steps: crate::pathfinding::astar::DEFAULT_MAX_STEPS,
        }
    }
}

/// The services an operation may use, minus the mutable world.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub scheduler: &'a Scheduler,
    pub path_finder: &'a dyn PathFinder,
    pub items: &'a dyn ItemFactory,
    pub monster_types: &'a dyn MonsterTypeRepository,
    pub settings: &'a MechanicsSettings,
}

/// Everything one event execution can see and touch.
pub struct OperationContext<'a> {
    pub event_id: EventId,
    pub requestor: CreatureId,
    pub now: GameTick,
    pub scheduler: &'a Scheduler,
    pub creatures: &'a mut dyn CreatureManager,
    pub map: &'a mut dyn SpatialMap,
    pub path_finder: &'a dyn PathFinder,
    pub items: &'a dyn ItemFactory,
    pub monster_types: &'a dyn MonsterTypeRepository,
    pub settings: &'a MechanicsSettings,
    pub rng: &'a mut dyn RngCore,
    /// Set to have this same event run again after the given delay.
    pub repeat_after: Option<Duration>,
    outbox: Vec<Box<dyn Notification>>,
    departed: Vec<CreatureId>,
}

impl<'a> OperationContext<'a> {
    pub fn new(
        event_id: EventId,
        requestor: CreatureId,
        services: Services<'a>,
        creatures: &'a mut dyn CreatureManager,
        map: &'a mut dyn SpatialMap,
        rng: &'a mut dyn RngCore,
    ) -> Self {
        Self {
            event_id,
            requestor,
            now: services.scheduler.current_time(),
            scheduler: services.scheduler,
            creatures,
            map,
            path_finder: services.path_finder,
            items: services.items,
            monster_types: services.monster_types,
            settings: services.settings,
            rng,
            repeat_after: None,
            outbox: Vec::new(),
            departed: Vec::new(),
        }
    }

    /// Queues a notification; it is sent once the event has finished.
    pub fn notify(&mut self, notification: impl Notification + 'static) {
        self.outbox.push(Box::new(notification));
    }

    pub fn take_notifications(&mut self) -> Vec<Box<dyn Notification>> {
        std::mem::take(&mut self.outbox)
    }

    pub fn pending_notifications(&self) -> usize {
        self.outbox.len()
    }

    /// Records that `creature` has left the game. Clients forget it once
    /// this event's notifications are out.
    pub fn creature_departed(&mut self, creature: CreatureId) {
        if !self.departed.contains(&creature) {
            self.departed.push(creature);
        }
    }

    pub fn take_departed(&mut self) -> Vec<CreatureId> {
        std::mem::take(&mut self.departed)
    }

    pub fn schedule(
        &self,
        requestor: CreatureId,
        operation: impl Operation + 'static,
        delay: Duration,
    ) -> EventId {
        self.scheduler
            .schedule(ScheduledEvent::operation(requestor, operation), delay)
    }

    pub fn find_path(&mut self, request: &PathRequest) -> PathOutcome {
        self.path_finder
            .find_between(&*self.map, request, &mut *self.rng)
    }

    pub fn remaining_exhaustion(&self, creature: CreatureId, category: ExhaustionCategory) -> Duration {
        self.creatures
            .find_creature(creature)
            .map(|creature| creature.exhaustion.remaining(category, self.now))
            .unwrap_or(Duration::ZERO)
    }
}
