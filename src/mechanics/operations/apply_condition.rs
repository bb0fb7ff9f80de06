use crate::error::EventError;
use crate::mechanics::conditions::{condition_flags, InFightCondition};
use crate::mechanics::context::OperationContext;
use crate::notifications::kinds::PlayerNotification;
use crate::notifications::OutboundPayload;
use crate::scheduling::event::{Condition, EventType, Operation};
use crate::scheduling::scheduler::ConditionApplied;
use crate::world::creatures::CreatureId;
use std::fmt;
use tracing::{debug, trace};

/// Puts a condition on a creature, merging it with one already running.
pub struct ApplyConditionOperation {
    creature: CreatureId,
    condition: Option<Box<dyn Condition>>,
}

impl ApplyConditionOperation {
    pub fn new(creature: CreatureId, condition: Box<dyn Condition>) -> Self {
        Self {
            creature,
            condition: Some(condition),
        }
    }

    /// In-fight for the configured duration, counted from when this runs.
    pub fn in_fight(creature: CreatureId) -> Self {
        Self {
            creature,
            condition: None,
        }
    }
}

impl fmt::Debug for ApplyConditionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplyConditionOperation")
            .field("creature", &self.creature)
            .field("condition", &self.condition.as_ref().map(|c| c.condition_type()))
            .finish()
    }
}

impl Operation for ApplyConditionOperation {
    fn event_type(&self) -> EventType {
        EventType::APPLY_CONDITION
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        let condition: Box<dyn Condition> = match self.condition.take() {
            Some(condition) => condition,
            None => Box::new(InFightCondition::new(ctx.now.after(ctx.settings.in_fight_duration))),
        };
        let condition_type = condition.condition_type();
        let delay = condition.ends_at().remaining_from(ctx.now);

        let creature = ctx
            .creatures
            .find_creature_mut(self.creature)
            .ok_or(EventError::CreatureNotFound(self.creature))?;
        let newly_set = creature.conditions.insert(condition_type);
        if newly_set && creature.is_player() {
            let flags = condition_flags(&creature.conditions);
            ctx.notify(PlayerNotification::new(
                self.creature,
                vec![OutboundPayload::PlayerConditions { flags }],
            ));
        }

        let applied = ctx
            .scheduler
            .add_or_aggregate_condition(self.creature, condition, delay);
        if applied == ConditionApplied::Rejected {
            debug!(creature = %self.creature, ?condition_type, "live condition refused the merge");
        } else {
            trace!(creature = %self.creature, ?condition_type, ?applied, "condition applied");
        }
        Ok(())
    }
}
