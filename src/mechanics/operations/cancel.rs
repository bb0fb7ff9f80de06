use crate::error::EventError;
use crate::mechanics::context::OperationContext;
use crate::notifications::kinds::PlayerNotification;
use crate::notifications::OutboundPayload;
use crate::scheduling::event::{EventType, Operation};
use crate::world::creatures::CreatureId;
use tracing::debug;

/// Drops a creature's pending work of one type, or of every type by default.
#[derive(Debug, Clone, Copy)]
pub struct CancelOperationsOperation {
    creature: CreatureId,
    filter: EventType,
}

impl CancelOperationsOperation {
    pub fn new(creature: CreatureId) -> Self {
        Self::of_type(creature, EventType::OPERATION)
    }

    pub fn of_type(creature: CreatureId, filter: EventType) -> Self {
        Self { creature, filter }
    }
}

impl Operation for CancelOperationsOperation {
    fn event_type(&self) -> EventType {
        EventType::CANCEL_OPERATIONS
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        let cancelled = ctx.scheduler.cancel_all_for(self.creature, self.filter);
        debug!(creature = %self.creature, filter = %self.filter, cancelled, "operations cancelled");

        let Some(creature) = ctx.creatures.find_creature_mut(self.creature) else {
            return Ok(());
        };
        if EventType::AUTO_WALK.is_a(self.filter) {
            creature.walk_plan = None;
        }
        if !creature.is_player() {
            return Ok(());
        }
        if self.filter == EventType::OPERATION {
            creature.attack_target = None;
        }
        let direction = creature.direction.client_safe();
        ctx.notify(PlayerNotification::new(
            self.creature,
            vec![
                OutboundPayload::PlayerCancelAttack,
                OutboundPayload::PlayerCancelWalk { direction },
            ],
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanics::context::testing::TestWorld;
    use crate::mechanics::operations::movement::MovementOperation;
    use crate::mechanics::operations::speech::SpeechOperation;
    use crate::notifications::SpeechType;
    use crate::pathfinding::WalkPlan;
    use crate::scheduling::event::ScheduledEvent;
    use crate::world::creatures::{Creature, CreatureFinder, CreatureManager};
    use crate::world::position::{Direction, Position};
    use std::time::Duration;

    fn busy_player(world: &mut TestWorld) {
        let at = Position::new(10, 10, 7);
        let mut player = Creature::player(CreatureId(1), "Busy", at);
        player.attack_target = Some(CreatureId(9));
        player.walk_plan = Some(WalkPlan::from_directions(at, &[Direction::North]));
        world.creatures.add_creature(player);
        world.scheduler.schedule(
            ScheduledEvent::operation(CreatureId(1), MovementOperation::new(CreatureId(1), at, Position::new(10, 9, 7))),
            Duration::from_millis(200),
        );
        world.scheduler.schedule(
            ScheduledEvent::operation(CreatureId(1), SpeechOperation::new(CreatureId(1), SpeechType::Say, "hi")),
            Duration::from_millis(200),
        );
    }

    #[test]
    fn root_cancel_clears_everything_and_tells_the_client() {
        let mut world = TestWorld::new();
        busy_player(&mut world);
        let mut cancel = CancelOperationsOperation::new(CreatureId(1));
        world.execute(CreatureId(1), &mut cancel).expect("cancel");

        assert!(world.scheduler.is_empty());
        let player = world.creatures.find_creature(CreatureId(1)).expect("player");
        assert_eq!(player.attack_target, None);
        assert!(player.walk_plan.is_none());
        assert_eq!(
            world.sink.delivered_to(CreatureId(1)),
            vec![
                OutboundPayload::PlayerCancelAttack,
                OutboundPayload::PlayerCancelWalk { direction: Direction::South },
            ]
        );
    }

    #[test]
    fn typed_cancel_keeps_other_work_and_the_target() {
        let mut world = TestWorld::new();
        busy_player(&mut world);
        let mut cancel = CancelOperationsOperation::of_type(CreatureId(1), EventType::MOVEMENT);
        world.execute(CreatureId(1), &mut cancel).expect("cancel");

        assert_eq!(world.scheduler.len(), 1);
        assert_eq!(world.scheduler.pending_count_for(CreatureId(1), EventType::SPEECH), 1);
        let player = world.creatures.find_creature(CreatureId(1)).expect("player");
        assert_eq!(player.attack_target, Some(CreatureId(9)));
        assert!(player.walk_plan.is_none());
    }
}
