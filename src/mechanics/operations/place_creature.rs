use crate::error::EventError;
use crate::mechanics::context::OperationContext;
use crate::mechanics::operations::movement::is_free_to_enter;
use crate::notifications::kinds::CreatureAppearedNotification;
use crate::notifications::MagicEffect;
use crate::scheduling::event::{EventType, Operation};
use crate::world::creatures::Creature;
use crate::world::position::Position;
use tracing::{debug, warn};

/// Brings a new monster of `race` into the world at `location`.
#[derive(Debug, Clone)]
pub struct PlaceCreatureOperation {
    race: String,
    location: Position,
}

impl PlaceCreatureOperation {
    pub fn monster(race: impl Into<String>, location: Position) -> Self {
        Self {
            race: race.into(),
            location,
        }
    }
}

impl Operation for PlaceCreatureOperation {
    fn event_type(&self) -> EventType {
        EventType::PLACE_CREATURE
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        let Some(monster_type) = ctx.monster_types.monster_type(&self.race) else {
            warn!(race = %self.race, "cannot place unknown monster race");
            return Ok(());
        };
        if !is_free_to_enter(ctx, self.location) {
            debug!(race = %self.race, location = %self.location, "placement spot is taken");
            return Ok(());
        }
        let id = ctx.creatures.next_creature_id();
        ctx.creatures
            .add_creature(Creature::monster(id, &monster_type, self.location));
        debug!(creature = %id, race = %self.race, location = %self.location, "monster placed");
        ctx.notify(CreatureAppearedNotification {
            creature: id,
            location: self.location,
            effect: Some(MagicEffect::BlueShimmer),
        });
        Ok(())
    }
}
