use crate::error::EventError;
use crate::mechanics::conditions::ConditionType;
use crate::mechanics::context::OperationContext;
use crate::scheduling::exhaustion::ExhaustionCost;
use crate::world::creatures::CreatureId;
use crate::world::time::GameTick;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

impl EventId {
    pub fn next() -> Self {
        EventId(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Dotted event tag. A tag names its ancestors by prefix, so
/// `operation.movement.auto_walk` is an `operation.movement` and an `operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(&'static str);

impl EventType {
    pub const OPERATION: EventType = EventType("operation");
    pub const MOVEMENT: EventType = EventType("operation.movement");
    pub const AUTO_WALK: EventType = EventType("operation.movement.auto_walk");
    pub const TURN: EventType = EventType("operation.movement.turn");
    pub const SPEECH: EventType = EventType("operation.speech");
    pub const DEATH: EventType = EventType("operation.death");
    pub const CREATE_ITEM: EventType = EventType("operation.create_item");
    pub const CANCEL_OPERATIONS: EventType = EventType("operation.cancel");
    pub const APPLY_CONDITION: EventType = EventType("operation.apply_condition");
    pub const ELEVATED: EventType = EventType("operation.elevated");
    pub const SPAWN_MONSTERS: EventType = EventType("operation.elevated.spawn");
    pub const PLACE_CREATURE: EventType = EventType("operation.elevated.place_creature");
    pub const CONDITION: EventType = EventType("condition");

    pub const fn new(tag: &'static str) -> Self {
        EventType(tag)
    }

    pub fn as_str(self) -> &'static str {
        self.0
    }

    /// True for `ancestor` itself and every dotted descendant of it.
    pub fn is_a(self, ancestor: EventType) -> bool {
        match self.0.strip_prefix(ancestor.0) {
            Some("") => true,
            Some(rest) => rest.starts_with('.'),
            None => false,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A one-shot unit of game logic.
pub trait Operation: Send {
    fn event_type(&self) -> EventType;

    /// Cooldown charged to the requestor after a successful run.
    fn exhaustion_cost(&self) -> ExhaustionCost {
        ExhaustionCost::new()
    }

    /// Elevated operations run on behalf of the server and skip per-creature checks.
    fn is_elevated(&self) -> bool {
        self.event_type().is_a(EventType::ELEVATED)
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError>;
}

/// A recurring, mergeable status effect. At most one per (creature, type).
pub trait Condition: Send {
    fn condition_type(&self) -> ConditionType;

    fn event_type(&self) -> EventType {
        self.condition_type().event_type()
    }

    fn ends_at(&self) -> GameTick;

    /// Folds a newly applied condition of the same type into this one.
    /// Returns whether anything changed.
    fn aggregate(&mut self, other: &dyn Condition) -> bool;

    /// Runs one cycle. `ctx.repeat_after` starts cleared for every cycle.
    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError>;
}

pub enum Work {
    Operation(Box<dyn Operation>),
    Condition(Box<dyn Condition>),
}

impl Work {
    pub fn event_type(&self) -> EventType {
        match self {
            Work::Operation(operation) => operation.event_type(),
            Work::Condition(condition) => condition.event_type(),
        }
    }

    pub fn is_elevated(&self) -> bool {
        match self {
            Work::Operation(operation) => operation.is_elevated(),
            Work::Condition(_) => false,
        }
    }

    pub fn condition_type(&self) -> Option<ConditionType> {
        match self {
            Work::Operation(_) => None,
            Work::Condition(condition) => Some(condition.condition_type()),
        }
    }

    pub fn as_condition_mut(&mut self) -> Option<&mut dyn Condition> {
        match self {
            Work::Operation(_) => None,
            Work::Condition(condition) => Some(condition.as_mut()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub id: EventId,
    pub requestor: CreatureId,
    pub event_type: EventType,
    pub scheduled_at: GameTick,
    /// Cadence set at creation; an operation starts every run with it.
    /// `None` means the event only repeats when a run asks to.
    pub repeat_after: Option<Duration>,
    pub can_be_cancelled: bool,
}

pub struct ScheduledEvent {
    pub meta: EventMeta,
    pub work: Work,
}

impl ScheduledEvent {
    fn new(requestor: CreatureId, work: Work) -> Self {
        Self {
            meta: EventMeta {
                id: EventId::next(),
                requestor,
                event_type: work.event_type(),
                scheduled_at: GameTick::ZERO,
                repeat_after: None,
                can_be_cancelled: true,
            },
            work,
        }
    }

    pub fn operation(requestor: CreatureId, operation: impl Operation + 'static) -> Self {
        Self::new(requestor, Work::Operation(Box::new(operation)))
    }

    pub fn condition(requestor: CreatureId, condition: impl Condition + 'static) -> Self {
        Self::new(requestor, Work::Condition(Box::new(condition)))
    }

    pub fn from_work(requestor: CreatureId, work: Work) -> Self {
        Self::new(requestor, work)
    }

    pub fn repeating(mut self, every: Duration) -> Self {
        self.meta.repeat_after = Some(every);
        self
    }

    pub fn not_cancellable(mut self) -> Self {
        self.meta.can_be_cancelled = false;
        self
    }

    pub fn id(&self) -> EventId {
        self.meta.id
    }

    pub fn event_type(&self) -> EventType {
        self.meta.event_type
    }

    pub fn requestor(&self) -> CreatureId {
        self.meta.requestor
    }

    /// Whether `CancelAllFor(requestor, filter)` applies to this event.
    pub fn matches(&self, requestor: CreatureId, filter: EventType) -> bool {
        self.meta.can_be_cancelled
            && self.meta.requestor == requestor
            && self.meta.event_type.is_a(filter)
    }
}

impl fmt::Debug for ScheduledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEvent")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_itself_and_descendants_only() {
        assert!(EventType::AUTO_WALK.is_a(EventType::MOVEMENT));
        assert!(EventType::AUTO_WALK.is_a(EventType::OPERATION));
        assert!(EventType::MOVEMENT.is_a(EventType::MOVEMENT));
        assert!(!EventType::MOVEMENT.is_a(EventType::AUTO_WALK));
        assert!(!EventType::SPEECH.is_a(EventType::MOVEMENT));
        assert!(!EventType::new("operation.movementish").is_a(EventType::MOVEMENT));
        assert!(!EventType::CONDITION.is_a(EventType::OPERATION));
    }

    #[test]
    fn event_ids_are_unique() {
        let a = EventId::next();
        let b = EventId::next();
        assert_ne!(a, b);
    }
}
