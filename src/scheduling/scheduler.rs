//! Time-ordered event queue.
//!
//! Any thread may schedule or cancel. Exactly one consumer drains due events
//! with [`Scheduler::pop_due`] and hands each back through
//! [`Scheduler::complete`] once it has run, which is where repeats are
//! re-queued. Entries are kept in a min-heap keyed by (due time, submission
//! order) with lazy deletion: cancelling only drops the event from the pending
//! index and the stale heap entry is skipped when it surfaces.

use crate::mechanics::conditions::ConditionType;
use crate::scheduling::event::{Condition, EventId, EventMeta, EventType, ScheduledEvent, Work};
use crate::world::creatures::CreatureId;
use crate::world::time::{Clock, GameTick};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    at: GameTick,
    sequence: u64,
    id: EventId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we want earliest, then oldest.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Executing {
    meta: EventMeta,
    condition_type: Option<ConditionType>,
    cancelled: bool,
    /// Same-typed conditions applied while this one was running.
    absorbed: Vec<(Box<dyn Condition>, Duration)>,
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    pending: HashMap<EventId, (u64, ScheduledEvent)>,
    next_sequence: u64,
    executing: Option<Executing>,
}

impl QueueState {
    fn insert(&mut self, mut event: ScheduledEvent, at: GameTick) -> EventId {
        let id = event.id();
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        event.meta.scheduled_at = at;
        self.heap.push(QueueEntry { at, sequence, id });
        self.pending.insert(id, (sequence, event));
        id
    }

    /// Drops stale heap entries and returns the live head, if any.
    fn head(&mut self) -> Option<QueueEntry> {
        while let Some(entry) = self.heap.peek().copied() {
            match self.pending.get(&entry.id) {
                Some((sequence, _)) if *sequence == entry.sequence => return Some(entry),
                _ => {
                    self.heap.pop();
                }
            }
        }
        None
    }

    fn pending_condition_mut(
        &mut self,
        requestor: CreatureId,
        condition_type: ConditionType,
    ) -> Option<&mut dyn Condition> {
        self.pending
            .values_mut()
            .map(|(_, event)| event)
            .find(|event| {
                event.meta.requestor == requestor
                    && event.work.condition_type() == Some(condition_type)
            })
            .and_then(|event| event.work.as_condition_mut())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionApplied {
    /// No live condition of that type existed; this one was queued.
    Scheduled(EventId),
    /// Merged into the live condition.
    Aggregated,
    /// The live condition refused the merge; nothing changed.
    Rejected,
}

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(QueueState::default()),
            wakeup: Condvar::new(),
        }
    }

    pub fn current_time(&self) -> GameTick {
        self.clock.now()
    }

    /// Queues `event` to run `delay` from now. A zero delay still waits for the consumer.
    pub fn schedule(&self, event: ScheduledEvent, delay: Duration) -> EventId {
        let at = self.current_time().after(delay);
        let event_type = event.event_type();
        let requestor = event.requestor();
        let id = self.lock().insert(event, at);
        trace!(event_id = %id, %event_type, %requestor, %at, "event scheduled");
        self.wakeup.notify_all();
        id
    }

    /// Removes every pending event of `requestor` whose type is `filter` or
    /// a subtype of it. The event currently executing (if it matches) keeps
    /// running but will not repeat. Returns how many pending events were removed.
    pub fn cancel_all_for(&self, requestor: CreatureId, filter: EventType) -> usize {
        let mut state = self.lock();
        let before = state.pending.len();
        state
            .pending
            .retain(|_, (_, event)| !event.matches(requestor, filter));
        let removed = before - state.pending.len();
        if let Some(executing) = state.executing.as_mut() {
            if executing.meta.can_be_cancelled
                && executing.meta.requestor == requestor
                && executing.meta.event_type.is_a(filter)
            {
                executing.cancelled = true;
                executing.absorbed.clear();
            }
        }
        debug!(%requestor, %filter, removed, "events cancelled");
        removed
    }

    pub fn pending_count_for(&self, requestor: CreatureId, filter: EventType) -> usize {
        self.lock()
            .pending
            .values()
            .filter(|(_, event)| {
                event.meta.requestor == requestor && event.meta.event_type.is_a(filter)
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Time until the earliest pending event is due; zero if it already is.
    pub fn next_due_in(&self) -> Option<Duration> {
        let now = self.current_time();
        self.lock().head().map(|entry| entry.at.remaining_from(now))
    }

    /// Takes the earliest due event, marking it as executing.
    pub fn pop_due(&self) -> Option<ScheduledEvent> {
        let now = self.current_time();
        let mut state = self.lock();
        let entry = state.head()?;
        if entry.at > now {
            return None;
        }
        state.heap.pop();
        let (_, event) = state.pending.remove(&entry.id)?;
        state.executing = Some(Executing {
            meta: event.meta.clone(),
            condition_type: event.work.condition_type(),
            cancelled: false,
            absorbed: Vec::new(),
        });
        Some(event)
    }

    /// Hands back the event `pop_due` returned after it ran (or failed).
    /// Returns whether it was queued again.
    pub fn complete(&self, mut event: ScheduledEvent, repeat_after: Option<Duration>) -> bool {
        let now = self.current_time();
        let requestor = event.requestor();
        let mut state = self.lock();
        let (cancelled, mut absorbed) = match state.executing.take() {
            Some(executing) if executing.meta.id == event.id() => {
                (executing.cancelled, executing.absorbed)
            }
            other => {
                state.executing = other;
                (false, Vec::new())
            }
        };

        let repeats = match repeat_after {
            Some(after) if !cancelled => {
                if let Some(condition) = event.work.as_condition_mut() {
                    for (other, _) in absorbed.drain(..) {
                        condition.aggregate(other.as_ref());
                    }
                }
                let id = state.insert(event, now.after(after));
                trace!(event_id = %id, after_ms = after.as_millis() as u64, "event repeats");
                true
            }
            _ => false,
        };

        // Conditions absorbed by one that has now stopped become the live instance.
        let mut leftovers = absorbed.into_iter();
        if let Some((mut first, delay)) = leftovers.next() {
            for (other, _) in leftovers {
                first.aggregate(other.as_ref());
            }
            state.insert(
                ScheduledEvent::from_work(requestor, Work::Condition(first)),
                now.after(delay),
            );
        }
        drop(state);
        self.wakeup.notify_all();
        repeats
    }

    /// Applies `condition` to `requestor`, merging it into a live condition
    /// of the same type when there is one.
    pub fn add_or_aggregate_condition(
        &self,
        requestor: CreatureId,
        condition: Box<dyn Condition>,
        delay: Duration,
    ) -> ConditionApplied {
        let condition_type = condition.condition_type();
        let mut state = self.lock();
        if let Some(existing) = state.pending_condition_mut(requestor, condition_type) {
            return if existing.aggregate(condition.as_ref()) {
                ConditionApplied::Aggregated
            } else {
                ConditionApplied::Rejected
            };
        }
        if let Some(executing) = state.executing.as_mut() {
            if executing.meta.requestor == requestor
                && executing.condition_type == Some(condition_type)
                && !executing.cancelled
            {
                executing.absorbed.push((condition, delay));
                return ConditionApplied::Aggregated;
            }
        }
        let at = self.current_time().after(delay);
        let id = state.insert(
            ScheduledEvent::from_work(requestor, Work::Condition(condition)),
            at,
        );
        drop(state);
        self.wakeup.notify_all();
        ConditionApplied::Scheduled(id)
    }

    /// Blocks until an event may be due, something new is scheduled, or `max` passes.
    pub fn wait_for_work(&self, max: Duration) {
        let now = self.current_time();
        let mut state = self.lock();
        let wait = match state.head() {
            Some(entry) => entry.at.remaining_from(now).min(max),
            None => max,
        };
        if wait.is_zero() {
            return;
        }
        let _ = self
            .wakeup
            .wait_timeout(state, wait)
            .map_err(|poisoned| poisoned.into_inner());
    }

    /// Wakes a consumer parked in [`Scheduler::wait_for_work`].
    pub fn wake(&self) {
        self.wakeup.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EventError;
    use crate::mechanics::conditions::InFightCondition;
    use crate::mechanics::context::OperationContext;
    use crate::scheduling::event::Operation;
    use crate::world::time::ManualClock;
    use proptest::prelude::*;

    struct Tagged(EventType);

    impl Operation for Tagged {
        fn event_type(&self) -> EventType {
            self.0
        }

        fn execute(&mut self, _ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
            Ok(())
        }
    }

    fn scheduler() -> (Arc<ManualClock>, Scheduler) {
        let clock = Arc::new(ManualClock::new(GameTick(1_000)));
        let scheduler = Scheduler::new(clock.clone());
        (clock, scheduler)
    }

    fn tagged(requestor: u32, event_type: EventType) -> ScheduledEvent {
        ScheduledEvent::operation(CreatureId(requestor), Tagged(event_type))
    }

    fn drain(scheduler: &Scheduler) -> Vec<EventId> {
        let mut order = Vec::new();
        while let Some(event) = scheduler.pop_due() {
            order.push(event.id());
            scheduler.complete(event, None);
        }
        order
    }

    proptest! {
        #[test]
        fn equal_times_run_in_submission_order(delays in prop::collection::vec(0u64..4, 1..40)) {
            let (clock, scheduler) = scheduler();
            let mut submitted = Vec::new();
            for delay in &delays {
                let id = scheduler.schedule(tagged(1, EventType::SPEECH), Duration::from_millis(*delay));
                submitted.push((*delay, id));
            }
            clock.advance(Duration::from_millis(10));
            let mut expected = submitted.clone();
            expected.sort_by_key(|(delay, _)| *delay);
            let expected: Vec<EventId> = expected.into_iter().map(|(_, id)| id).collect();
            prop_assert_eq!(drain(&scheduler), expected);
        }
    }

    #[test]
    fn concurrent_producers_keep_their_own_submission_order() {
        let (_, scheduler) = scheduler();
        let submitted: Vec<Vec<EventId>> = std::thread::scope(|scope| {
            let producers: Vec<_> = (1..=8u32)
                .map(|producer| {
                    let scheduler = &scheduler;
                    scope.spawn(move || {
                        (0..500)
                            .map(|_| scheduler.schedule(tagged(producer, EventType::SPEECH), Duration::ZERO))
                            .collect()
                    })
                })
                .collect();
            producers
                .into_iter()
                .map(|producer| producer.join().expect("producer thread"))
                .collect()
        });

        let mut drained: Vec<Vec<EventId>> = vec![Vec::new(); 8];
        while let Some(event) = scheduler.pop_due() {
            drained[(event.requestor().0 - 1) as usize].push(event.id());
            scheduler.complete(event, None);
        }
        assert_eq!(drained.iter().map(Vec::len).sum::<usize>(), 4_000);
        assert_eq!(drained, submitted);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn events_wait_until_due() {
        let (clock, scheduler) = scheduler();
        let late = scheduler.schedule(tagged(1, EventType::SPEECH), Duration::from_millis(300));
        let soon = scheduler.schedule(tagged(1, EventType::SPEECH), Duration::from_millis(100));
        assert_eq!(scheduler.next_due_in(), Some(Duration::from_millis(100)));
        assert!(scheduler.pop_due().is_none());
        clock.advance(Duration::from_millis(100));
        assert_eq!(drain(&scheduler), vec![soon]);
        clock.advance(Duration::from_millis(200));
        assert_eq!(drain(&scheduler), vec![late]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn zero_delay_is_not_run_inline() {
        let (_, scheduler) = scheduler();
        scheduler.schedule(tagged(1, EventType::SPEECH), Duration::ZERO);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.next_due_in(), Some(Duration::ZERO));
    }

    #[test]
    fn cancel_is_a_wildcard_over_subtypes_of_one_requestor() {
        let (clock, scheduler) = scheduler();
        scheduler.schedule(tagged(1, EventType::MOVEMENT), Duration::from_millis(10));
        scheduler.schedule(tagged(1, EventType::AUTO_WALK), Duration::from_millis(10));
        let speech = scheduler.schedule(tagged(1, EventType::SPEECH), Duration::from_millis(10));
        let other = scheduler.schedule(tagged(2, EventType::AUTO_WALK), Duration::from_millis(10));

        assert_eq!(scheduler.cancel_all_for(CreatureId(1), EventType::MOVEMENT), 2);
        assert_eq!(scheduler.pending_count_for(CreatureId(1), EventType::OPERATION), 1);
        clock.advance(Duration::from_millis(10));
        assert_eq!(drain(&scheduler), vec![speech, other]);
    }

    #[test]
    fn cancelling_the_root_type_clears_everything_cancellable() {
        let (_, scheduler) = scheduler();
        scheduler.schedule(tagged(1, EventType::MOVEMENT), Duration::ZERO);
        scheduler.schedule(tagged(1, EventType::SPAWN_MONSTERS), Duration::ZERO);
        scheduler.schedule(tagged(1, EventType::SPEECH).not_cancellable(), Duration::ZERO);
        assert_eq!(scheduler.cancel_all_for(CreatureId(1), EventType::OPERATION), 2);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn executing_event_can_schedule_more_work() {
        let (_, scheduler) = scheduler();
        scheduler.schedule(tagged(1, EventType::AUTO_WALK), Duration::ZERO);
        let running = scheduler.pop_due().expect("due");
        let child = scheduler.schedule(tagged(1, EventType::MOVEMENT), Duration::ZERO);
        assert!(!scheduler.complete(running, None));
        assert_eq!(drain(&scheduler), vec![child]);
    }

    #[test]
    fn repeating_event_keeps_its_id_and_comes_back_later() {
        let (clock, scheduler) = scheduler();
        let id = scheduler.schedule(tagged(1, EventType::AUTO_WALK), Duration::ZERO);
        let running = scheduler.pop_due().expect("due");
        assert!(scheduler.complete(running, Some(Duration::from_millis(250))));
        assert!(scheduler.pop_due().is_none());
        clock.advance(Duration::from_millis(250));
        let again = scheduler.pop_due().expect("repeat due");
        assert_eq!(again.id(), id);
        assert_eq!(again.meta.repeat_after, None);
    }

    #[test]
    fn cancelling_while_executing_prevents_the_repeat() {
        let (_, scheduler) = scheduler();
        scheduler.schedule(tagged(1, EventType::AUTO_WALK), Duration::ZERO);
        let running = scheduler.pop_due().expect("due");
        assert_eq!(scheduler.cancel_all_for(CreatureId(1), EventType::MOVEMENT), 0);
        assert!(!scheduler.complete(running, Some(Duration::from_millis(100))));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn second_in_fight_condition_is_aggregated() {
        let (_, scheduler) = scheduler();
        let first = scheduler.add_or_aggregate_condition(
            CreatureId(1),
            Box::new(InFightCondition::new(GameTick(61_000))),
            Duration::ZERO,
        );
        assert!(matches!(first, ConditionApplied::Scheduled(_)));
        let second = scheduler.add_or_aggregate_condition(
            CreatureId(1),
            Box::new(InFightCondition::new(GameTick(70_000))),
            Duration::ZERO,
        );
        assert_eq!(second, ConditionApplied::Aggregated);
        assert_eq!(scheduler.pending_count_for(CreatureId(1), EventType::CONDITION), 1);

        let other = scheduler.add_or_aggregate_condition(
            CreatureId(2),
            Box::new(InFightCondition::new(GameTick(70_000))),
            Duration::ZERO,
        );
        assert!(matches!(other, ConditionApplied::Scheduled(_)));
    }

    #[test]
    fn condition_applied_while_its_twin_runs_is_absorbed() {
        let (_, scheduler) = scheduler();
        scheduler.add_or_aggregate_condition(
            CreatureId(1),
            Box::new(InFightCondition::new(GameTick(61_000))),
            Duration::ZERO,
        );
        let running = scheduler.pop_due().expect("due");
        let applied = scheduler.add_or_aggregate_condition(
            CreatureId(1),
            Box::new(InFightCondition::new(GameTick(90_000))),
            Duration::ZERO,
        );
        assert_eq!(applied, ConditionApplied::Aggregated);
        assert_eq!(scheduler.len(), 0);

        assert!(!scheduler.complete(running, None));
        assert_eq!(scheduler.pending_count_for(CreatureId(1), EventType::CONDITION), 1);
    }
}
