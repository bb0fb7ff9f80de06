use crate::error::EventError;
use crate::mechanics::context::OperationContext;
use crate::notifications::kinds::{CreatureMovedNotification, CreatureTurnedNotification, PlayerNotification};
use crate::notifications::TextMessageType;
use crate::scheduling::event::{EventType, Operation};
use crate::scheduling::exhaustion::{ExhaustionCategory, ExhaustionCost};
use crate::world::creatures::{CreatureFinder, CreatureId};
use crate::world::position::{Direction, Position};
use tracing::debug;

/// One step of a creature onto an adjacent tile.
#[derive(Debug, Clone)]
pub struct MovementOperation {
    creature: CreatureId,
    from: Position,
    to: Position,
    cost: ExhaustionCost,
}

impl MovementOperation {
    pub fn new(creature: CreatureId, from: Position, to: Position) -> Self {
        Self {
            creature,
            from,
            to,
            cost: ExhaustionCost::new(),
        }
    }

    pub fn destination(&self) -> Position {
        self.to
    }

    fn refuse(&self, ctx: &mut OperationContext<'_>, reason: &str) {
        debug!(creature = %self.creature, from = %self.from, to = %self.to, reason, "step refused");
        let Some(creature) = ctx.creatures.find_creature_mut(self.creature) else {
            return;
        };
        if let Some(plan) = creature.walk_plan.as_mut() {
            plan.invalidate();
        }
        if creature.is_player() {
            ctx.notify(PlayerNotification::text(
                self.creature,
                TextMessageType::StatusSmall,
                "Sorry, not possible.",
            ));
        }
    }
}

/// Whether a creature could stand on `position` right now.
pub fn is_free_to_enter(ctx: &OperationContext<'_>, position: Position) -> bool {
    let walkable = ctx
        .map
        .tile_at(position)
        .map(|tile| !tile.is_path_blocking())
        .unwrap_or(false);
    walkable && ctx.creatures.creature_at(position).is_none()
}

impl Operation for MovementOperation {
    fn event_type(&self) -> EventType {
        EventType::MOVEMENT
    }

    fn exhaustion_cost(&self) -> ExhaustionCost {
        self.cost.clone()
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        let current = ctx
            .creatures
            .find_creature(self.creature)
            .map(|creature| creature.position)
            .ok_or(EventError::CreatureNotFound(self.creature))?;
        if current != self.from {
            debug!(creature = %self.creature, expected = %self.from, actual = %current, "stale step dropped");
            return Ok(());
        }
        let Some(direction) = self.from.direction_to(self.to).filter(|_| self.from.is_adjacent_to(self.to)) else {
            return Err(EventError::NotAdjacent {
                from: self.from,
                to: self.to,
            });
        };
        if !is_free_to_enter(ctx, self.to) {
            self.refuse(ctx, "destination blocked");
            return Ok(());
        }
        let ground_speed = ctx
            .map
            .tile_at(self.from)
            .map(|tile| tile.ground_speed)
            .ok_or(EventError::TileNotFound(self.from))?;

        let creature = ctx
            .creatures
            .find_creature_mut(self.creature)
            .ok_or(EventError::CreatureNotFound(self.creature))?;
        if !creature.can_walk() {
            return Ok(());
        }
        let step = creature.step_duration(ground_speed, direction);
        creature.move_to(self.to);
        creature.last_movement_cost_modifier = 1;
        self.cost = ExhaustionCost::single(ExhaustionCategory::Movement, step);

        ctx.notify(CreatureMovedNotification {
            creature: self.creature,
            from: self.from,
            to: self.to,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TurnOperation {
    creature: CreatureId,
    direction: Direction,
}

impl TurnOperation {
    pub fn new(creature: CreatureId, direction: Direction) -> Self {
        Self { creature, direction }
    }
}

impl Operation for TurnOperation {
    fn event_type(&self) -> EventType {
        EventType::TURN
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        let creature = ctx
            .creatures
            .find_creature_mut(self.creature)
            .ok_or(EventError::CreatureNotFound(self.creature))?;
        if creature.direction == self.direction {
            return Ok(());
        }
        creature.direction = self.direction;
        ctx.notify(CreatureTurnedNotification {
            creature: self.creature,
            direction: self.direction,
        });
        Ok(())
    }
}
