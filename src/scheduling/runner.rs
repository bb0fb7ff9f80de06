//! The single consumer that drains the scheduler and runs events against the world.

use crate::error::EventError;
use crate::mechanics::context::{MechanicsSettings, OperationContext, Services};
use crate::notifications::{dispatch, KnownCreatureSets, NotificationContext, NotificationSink};
use crate::pathfinding::{AStarPathFinder, PathFinder};
use crate::scheduling::event::{EventId, EventType, ScheduledEvent, Work};
use crate::scheduling::scheduler::Scheduler;
use crate::world::creatures::{Creature, CreatureFinder, CreatureId, CreatureManager, CreatureRegistry};
use crate::world::items::{ItemCatalog, ItemFactory};
use crate::world::map::Map;
use crate::world::monsters::{MonsterTypeCatalog, MonsterTypeRepository};
use rand_chacha::ChaCha8Rng;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, trace};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimulationSignal {
    Running = 0,
    Shutdown = 1,
}

/// Shared stop switch for [`EventRunner::run`].
#[derive(Debug)]
pub struct SimulationControl {
    signal: AtomicU8,
}

impl Default for SimulationControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationControl {
    pub fn new() -> Self {
        Self {
            signal: AtomicU8::new(SimulationSignal::Running as u8),
        }
    }

    pub fn request_shutdown(&self) {
        self.signal
            .store(SimulationSignal::Shutdown as u8, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.signal.load(Ordering::SeqCst) == SimulationSignal::Running as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Error(EventError),
    Panicked(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Error(error) => write!(f, "{error}"),
            FailureReason::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// An event that gave up. It was discarded; the loop went on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFailure {
    pub event_id: EventId,
    pub event_type: EventType,
    pub requestor: CreatureId,
    pub reason: FailureReason,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub executed: usize,
    /// Events whose requestor had already left the world.
    pub skipped: usize,
    pub failures: Vec<EventFailure>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn absorb(&mut self, report: &RunReport) {
        self.executed += report.executed;
        self.skipped += report.skipped;
        self.failed += report.failures.len();
    }
}

/// Owns the world and runs due events against it, one at a time.
pub struct EventRunner {
    scheduler: Arc<Scheduler>,
    creatures: CreatureRegistry,
    map: Map,
    path_finder: Box<dyn PathFinder>,
    items: Box<dyn ItemFactory>,
    monster_types: Box<dyn MonsterTypeRepository>,
    settings: MechanicsSettings,
    sink: Arc<dyn NotificationSink>,
    known_creatures: Arc<KnownCreatureSets>,
    rng: ChaCha8Rng,
}

impl EventRunner {
    pub fn new(
        scheduler: Arc<Scheduler>,
        map: Map,
        settings: MechanicsSettings,
        sink: Arc<dyn NotificationSink>,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            scheduler,
            creatures: CreatureRegistry::new(),
            map,
            path_finder: Box::new(AStarPathFinder::new(settings.default_max_steps)),
            items: Box::new(ItemCatalog::new()),
            monster_types: Box::new(MonsterTypeCatalog::new()),
            settings,
            sink,
            known_creatures: Arc::new(KnownCreatureSets::default()),
            rng,
        }
    }

    pub fn with_items(mut self, items: impl ItemFactory + 'static) -> Self {
        self.items = Box::new(items);
        self
    }

    pub fn with_monster_types(mut self, monster_types: impl MonsterTypeRepository + 'static) -> Self {
        self.monster_types = Box::new(monster_types);
        self
    }

    pub fn with_path_finder(mut self, path_finder: impl PathFinder + 'static) -> Self {
        self.path_finder = Box::new(path_finder);
        self
    }

    pub fn with_known_creatures(mut self, known_creatures: Arc<KnownCreatureSets>) -> Self {
        self.known_creatures = known_creatures;
        self
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn creatures(&self) -> &CreatureRegistry {
        &self.creatures
    }

    pub fn creatures_mut(&mut self) -> &mut CreatureRegistry {
        &mut self.creatures
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut Map {
        &mut self.map
    }

    pub fn settings(&self) -> &MechanicsSettings {
        &self.settings
    }

    pub fn known_creatures(&self) -> &Arc<KnownCreatureSets> {
        &self.known_creatures
    }

    /// Puts a connected player into the world.
    pub fn add_player(&mut self, player: Creature) {
        self.known_creatures.register(player.id);
        self.creatures.add_creature(player);
    }

    /// Runs every event that is due right now, in order.
    pub fn run_due(&mut self) -> RunReport {
        let mut report = RunReport::default();
        while let Some(mut event) = self.scheduler.pop_due() {
            let requestor = event.requestor();
            if !event.work.is_elevated()
                && !requestor.is_system()
                && self.creatures.find_creature(requestor).is_none()
            {
                trace!(event_id = %event.id(), %requestor, event_type = %event.event_type(), "requestor gone, event skipped");
                report.skipped += 1;
                self.scheduler.complete(event, None);
                continue;
            }

            let repeat_after = match self.execute(&mut event) {
                Ok(repeat_after) => repeat_after,
                Err(reason) => {
                    error!(event_id = %event.id(), %requestor, event_type = %event.event_type(), %reason, "event failed");
                    report.failures.push(EventFailure {
                        event_id: event.id(),
                        event_type: event.event_type(),
                        requestor,
                        reason,
                    });
                    None
                }
            };
            report.executed += 1;
            self.scheduler.complete(event, repeat_after);
        }
        report
    }

    /// Drains the queue until `control` says stop or `run_for` has passed on the scheduler clock.
    pub fn run(&mut self, control: &SimulationControl, run_for: Option<Duration>, idle_wait: Duration) -> RunSummary {
        let started = self.scheduler.current_time();
        let mut summary = RunSummary::default();
        info!(pending = self.scheduler.len(), "simulation started");
        while control.is_running() {
            let elapsed = Duration::from_millis(self.scheduler.current_time().0.saturating_sub(started.0));
            if run_for.map(|limit| elapsed >= limit).unwrap_or(false) {
                break;
            }
            let report = self.run_due();
            summary.absorb(&report);
            self.scheduler.wait_for_work(idle_wait);
        }
        info!(
            executed = summary.executed,
            skipped = summary.skipped,
            failed = summary.failed,
            creatures = self.creatures.len(),
            "simulation stopped"
        );
        summary
    }

    /// Runs one event body. Notifications it emitted are delivered even if it failed.
    fn execute(&mut self, event: &mut ScheduledEvent) -> Result<Option<Duration>, FailureReason> {
        let services = Services {
            scheduler: &self.scheduler,
            path_finder: self.path_finder.as_ref(),
            items: self.items.as_ref(),
            monster_types: self.monster_types.as_ref(),
            settings: &self.settings,
        };
        let mut ctx = OperationContext::new(
            event.meta.id,
            event.meta.requestor,
            services,
            &mut self.creatures,
            &mut self.map,
            &mut self.rng,
        );
        ctx.repeat_after = match &event.work {
            Work::Operation(_) => event.meta.repeat_after,
            Work::Condition(_) => None,
        };
        let work = &mut event.work;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match work {
            Work::Operation(operation) => operation.execute(&mut ctx),
            Work::Condition(condition) => condition.execute(&mut ctx),
        }));
        let now = ctx.now;
        let repeat_after = ctx.repeat_after;
        let notifications = ctx.take_notifications();
        let departed = ctx.take_departed();
        drop(ctx);

        let result = match outcome {
            Ok(Ok(())) => {
                if let Work::Operation(operation) = &event.work {
                    let cost = operation.exhaustion_cost();
                    if !cost.is_empty() {
                        if let Some(requestor) = self.creatures.find_creature_mut(event.meta.requestor) {
                            requestor.exhaustion.charge(&cost, now);
                        }
                    }
                }
                Ok(repeat_after)
            }
            Ok(Err(error)) => Err(FailureReason::Error(error)),
            Err(payload) => Err(FailureReason::Panicked(panic_message(payload.as_ref()))),
        };

        let notification_ctx = NotificationContext {
            map: &self.map,
            creatures: &self.creatures,
            known_creatures: &self.known_creatures,
            now: self.scheduler.current_time(),
        };
        for notification in notifications {
            dispatch(notification, &notification_ctx, self.sink.as_ref());
        }
        for creature in departed {
            self.known_creatures.depart(creature);
            trace!(%creature, "creature forgotten by all clients");
        }
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanics::conditions::ConditionType;
    use crate::mechanics::handlers::{handle_request, PlayerRequest};
    use crate::mechanics::context::testing::rat_type;
    use crate::mechanics::operations::{ApplyConditionOperation, DeathOperation};
    use crate::notifications::{OutboundPayload, RecordingSink};
    use crate::scheduling::event::Operation;
    use crate::world::position::{Direction, Position};
    use crate::world::time::{GameTick, ManualClock};
    use rand::SeedableRng;

    struct Failing;

    impl Operation for Failing {
        fn event_type(&self) -> EventType {
            EventType::SPEECH
        }

        fn execute(&mut self, _ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
            Err(EventError::Invariant("broken on purpose".to_string()))
        }
    }

    struct Exploding;

    impl Operation for Exploding {
        fn event_type(&self) -> EventType {
            EventType::ELEVATED
        }

        fn execute(&mut self, _ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
            panic!("boom");
        }
    }

    struct Counting(Arc<AtomicU8>);

    impl Operation for Counting {
        fn event_type(&self) -> EventType {
            EventType::TURN
        }

        fn execute(&mut self, _ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn runner() -> (Arc<ManualClock>, Arc<RecordingSink>, EventRunner) {
        let clock = Arc::new(ManualClock::new(GameTick(1_000)));
        let scheduler = Arc::new(Scheduler::new(clock.clone()));
        let sink = Arc::new(RecordingSink::new());
        let mut runner = EventRunner::new(
            scheduler,
            Map::open_floor("runner", 40, 40, 7, 150),
            MechanicsSettings::default(),
            sink.clone(),
            ChaCha8Rng::seed_from_u64(11),
        );
        runner.add_player(Creature::player(CreatureId(1), "Runner", Position::new(10, 10, 7)));
        (clock, sink, runner)
    }

    #[test]
    fn failures_are_reported_and_the_loop_keeps_going() {
        let (_, _, mut runner) = runner();
        let counter = Arc::new(AtomicU8::new(0));
        let scheduler = runner.scheduler().clone();
        scheduler.schedule(ScheduledEvent::operation(CreatureId(1), Failing), Duration::ZERO);
        scheduler.schedule(ScheduledEvent::operation(CreatureId::SYSTEM, Exploding), Duration::ZERO);
        scheduler.schedule(ScheduledEvent::operation(CreatureId(1), Counting(counter.clone())), Duration::ZERO);

        let report = runner.run_due();
        assert_eq!(report.executed, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let reasons: Vec<_> = report.failures.iter().map(|failure| failure.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                FailureReason::Error(EventError::Invariant("broken on purpose".to_string())),
                FailureReason::Panicked("boom".to_string()),
            ]
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn events_of_departed_creatures_are_skipped() {
        let (_, _, mut runner) = runner();
        let counter = Arc::new(AtomicU8::new(0));
        runner
            .scheduler()
            .schedule(ScheduledEvent::operation(CreatureId(42), Counting(counter.clone())), Duration::ZERO);
        let report = runner.run_due();
        assert_eq!((report.executed, report.skipped), (0, 1));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn in_fight_lasts_until_its_extended_end() {
        let (clock, sink, mut runner) = runner();
        let scheduler = runner.scheduler().clone();
        scheduler.schedule(
            ScheduledEvent::operation(CreatureId(1), ApplyConditionOperation::in_fight(CreatureId(1))),
            Duration::ZERO,
        );
        runner.run_due();
        clock.advance(Duration::from_secs(30));
        scheduler.schedule(
            ScheduledEvent::operation(CreatureId(1), ApplyConditionOperation::in_fight(CreatureId(1))),
            Duration::ZERO,
        );
        runner.run_due();

        clock.advance(Duration::from_secs(30));
        runner.run_due();
        assert!(runner
            .creatures()
            .find_creature(CreatureId(1))
            .map(|player| player.conditions.contains(&ConditionType::InFight))
            .unwrap_or(false));
        assert_eq!(scheduler.next_due_in(), Some(Duration::from_secs(30)));

        clock.advance(Duration::from_secs(30));
        runner.run_due();
        let player = runner.creatures().find_creature(CreatureId(1)).expect("player");
        assert!(player.conditions.is_empty());
        assert!(scheduler.is_empty());
        assert_eq!(
            sink.delivered_to(CreatureId(1)),
            vec![
                OutboundPayload::PlayerConditions { flags: 0x80 },
                OutboundPayload::PlayerConditions { flags: 0 },
            ]
        );
    }

    #[test]
    fn walk_request_moves_the_player_step_by_step() {
        let (clock, sink, mut runner) = runner();
        let scheduler = runner.scheduler().clone();
        handle_request(
            CreatureId(1),
            PlayerRequest::AutoWalk {
                directions: vec![Direction::East, Direction::East, Direction::South],
            },
            &scheduler,
            &MechanicsSettings::default(),
        )
        .expect("walk accepted");

        for _ in 0..20 {
            let report = runner.run_due();
            assert!(report.failures.is_empty());
            match scheduler.next_due_in() {
                Some(wait) => {
                    clock.advance(wait);
                }
                None => break,
            }
        }
        let player = runner.creatures().find_creature(CreatureId(1)).expect("player");
        assert_eq!(player.position, Position::new(12, 11, 7));
        assert!(scheduler.is_empty());
        let moves = sink
            .delivered_to(CreatureId(1))
            .into_iter()
            .filter(|payload| matches!(payload, OutboundPayload::CreatureMoved { .. }))
            .count();
        assert_eq!(moves, 3);
    }

    #[test]
    fn the_dead_are_forgotten_by_every_client() {
        let (_, _, mut runner) = runner();
        runner.add_player(Creature::player(CreatureId(2), "Faraway", Position::new(35, 35, 7)));
        runner
            .creatures_mut()
            .add_creature(Creature::monster(CreatureId(80), &rat_type(), Position::new(12, 10, 7)));
        let known = runner.known_creatures().clone();
        known.learn(CreatureId(1), CreatureId(2));
        known.learn(CreatureId(2), CreatureId(80));

        let scheduler = runner.scheduler().clone();
        scheduler.schedule(ScheduledEvent::operation(CreatureId::SYSTEM, DeathOperation::new(CreatureId(80))), Duration::ZERO);
        scheduler.schedule(ScheduledEvent::operation(CreatureId(1), DeathOperation::new(CreatureId(1))), Duration::ZERO);
        let report = runner.run_due();

        assert!(report.failures.is_empty());
        assert!(runner.creatures().find_creature(CreatureId(1)).is_none());
        assert!(runner.creatures().find_creature(CreatureId(80)).is_none());
        assert_eq!(known.known_count(CreatureId(1)), 0);
        assert_eq!(known.client_count(), 1);
        assert!(!known.knows(CreatureId(2), CreatureId(80)));
    }

    #[test]
    fn requests_arrive_while_the_loop_runs() {
        let (_, sink, mut runner) = runner();
        let scheduler = runner.scheduler().clone();
        let settings = runner.settings().clone();
        let control = Arc::new(SimulationControl::new());
        let loop_control = Arc::clone(&control);
        let consumer = std::thread::spawn(move || {
            let summary = runner.run(&loop_control, None, Duration::from_millis(5));
            (runner, summary)
        });

        let producers: Vec<_> = [CreatureId(1), CreatureId(42)]
            .into_iter()
            .map(|player| {
                let scheduler = scheduler.clone();
                let settings = settings.clone();
                std::thread::spawn(move || {
                    let request = PlayerRequest::AutoWalk { directions: vec![Direction::East] };
                    handle_request(player, request, &scheduler, &settings)
                })
            })
            .collect();
        for producer in producers {
            producer.join().expect("producer thread").expect("request accepted");
        }

        let moved = || {
            sink.delivered_to(CreatureId(1))
                .iter()
                .any(|payload| matches!(payload, OutboundPayload::CreatureMoved { .. }))
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline
            && !(moved() && scheduler.pending_count_for(CreatureId(42), EventType::OPERATION) == 0)
        {
            std::thread::sleep(Duration::from_millis(2));
        }
        control.request_shutdown();
        let (runner, summary) = consumer.join().expect("consumer thread");

        let player = runner.creatures().find_creature(CreatureId(1)).expect("player");
        assert_eq!(player.position, Position::new(11, 10, 7));
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn stopped_control_ends_the_run_immediately() {
        let (_, _, mut runner) = runner();
        let control = SimulationControl::new();
        control.request_shutdown();
        let summary = runner.run(&control, None, Duration::from_millis(1));
        assert_eq!(summary, RunSummary::default());
    }
}
