use crate::error::EventError;
use crate::mechanics::context::OperationContext;
use crate::notifications::kinds::{CreatureRemovedNotification, PlayerNotification, TileUpdatedNotification};
use crate::notifications::{OutboundPayload, TextMessageType};
use crate::scheduling::event::{EventType, Operation};
use crate::world::creatures::{CreatureFinder, CreatureId};
use crate::world::items::ItemCreationArguments;
use tracing::debug;

/// Share of `total_yield` earned by `damage` out of `total_damage`, rounded half to even.
pub fn experience_share(total_yield: u64, damage: u64, total_damage: u64) -> u64 {
    if total_damage == 0 {
        return 0;
    }
    let numerator = u128::from(total_yield) * u128::from(damage);
    let denominator = u128::from(total_damage);
    let quotient = numerator / denominator;
    let twice_remainder = (numerator % denominator) * 2;
    let rounded = if twice_remainder > denominator || (twice_remainder == denominator && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    };
    u64::try_from(rounded).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy)]
pub struct DeathOperation {
    creature: CreatureId,
}

impl DeathOperation {
    pub fn new(creature: CreatureId) -> Self {
        Self { creature }
    }
}

impl Operation for DeathOperation {
    fn event_type(&self) -> EventType {
        EventType::DEATH
    }

    /// Always runs; the dying creature may be the requestor.
    fn is_elevated(&self) -> bool {
        true
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        let dead = ctx
            .creatures
            .find_creature(self.creature)
            .ok_or(EventError::CreatureNotFound(self.creature))?;
        let location = dead.position;
        let facing = dead.direction;
        let is_player = dead.is_player();
        let corpse = dead.corpse;
        let pool = dead.blood.pool();
        let rewards: Vec<(CreatureId, u64)> = if dead.is_monster() && dead.experience_yield > 0 {
            let total_damage: u64 = dead.damage_taken.iter().map(|(_, damage)| u64::from(*damage)).sum();
            dead.damage_taken
                .iter()
                .filter(|(_, damage)| *damage > 0)
                .map(|(id, damage)| {
                    (*id, experience_share(u64::from(dead.experience_yield), u64::from(*damage), total_damage))
                })
                .filter(|(_, share)| *share > 0)
                .collect()
        } else {
            Vec::new()
        };

        if is_player {
            ctx.notify(PlayerNotification::text(
                self.creature,
                TextMessageType::EventAdvance,
                "You are dead.",
            ));
            ctx.notify(PlayerNotification::new(
                self.creature,
                vec![
                    OutboundPayload::PlayerCancelWalk {
                        direction: facing.client_safe(),
                    },
                    OutboundPayload::PlayerDeath,
                ],
            ));
        }

        for (id, share) in rewards {
            if let Some(killer) = ctx.creatures.find_creature_mut(id) {
                killer.add_experience(share);
                debug!(creature = %id, experience = share, "experience awarded");
            }
        }

        for id in ctx.creatures.creature_ids() {
            if let Some(other) = ctx.creatures.find_creature_mut(id) {
                other.remove_hostile(self.creature);
            }
        }
        ctx.scheduler.cancel_all_for(self.creature, EventType::OPERATION);
        ctx.scheduler.cancel_all_for(self.creature, EventType::CONDITION);

        if !ctx.map.has_tile_at(location) {
            return Ok(());
        }
        ctx.creatures.remove_creature(self.creature);
        ctx.creature_departed(self.creature);
        ctx.notify(CreatureRemovedNotification {
            creature: self.creature,
            location,
            effect: None,
        });
        let corpse_added = ctx
            .items
            .create(&ItemCreationArguments::of_type(corpse))
            .map(|item| ctx.map.add_item(location, item))
            .unwrap_or(false);
        if corpse_added {
            if let Some(item) = pool.and_then(|pool| ctx.items.create(&ItemCreationArguments::of_type(pool))) {
                ctx.map.add_item(location, item);
            }
        }
        ctx.notify(TileUpdatedNotification { location });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanics::context::testing::{rat_type, TestWorld, RAT_CORPSE};
    use crate::world::creatures::{Creature, CreatureManager};
    use crate::world::map::SpatialMap;
    use crate::world::monsters::BLOOD_POOL;
    use crate::world::position::Position;

    #[test]
    fn shares_round_half_to_even() {
        assert_eq!(experience_share(5, 1, 2), 2);
        assert_eq!(experience_share(7, 1, 2), 4);
        assert_eq!(experience_share(10, 1, 3), 3);
        assert_eq!(experience_share(10, 2, 3), 7);
        assert_eq!(experience_share(10, 0, 0), 0);
    }

    #[test]
    fn monster_death_splits_experience_and_leaves_a_corpse() {
        let mut world = TestWorld::new();
        let at = Position::new(15, 15, 7);
        let mut rat = Creature::monster(CreatureId(80), &rat_type(), at);
        rat.health = 0;
        rat.record_damage(CreatureId(1), 15);
        rat.record_damage(CreatureId(2), 5);
        world.creatures.add_creature(rat);
        let mut hunter = Creature::player(CreatureId(1), "Hunter", Position::new(16, 15, 7));
        hunter.add_hostile(CreatureId(80));
        world.creatures.add_creature(hunter);
        world
            .creatures
            .add_creature(Creature::player(CreatureId(2), "Helper", Position::new(14, 15, 7)));

        world.known.learn(CreatureId(2), CreatureId(80));

        let mut death = DeathOperation::new(CreatureId(80));
        world.execute(CreatureId(80), &mut death).expect("death");

        assert!(world.creatures.find_creature(CreatureId(80)).is_none());
        assert!(!world.known.knows(CreatureId(2), CreatureId(80)));
        let hunter = world.creatures.find_creature(CreatureId(1)).expect("hunter");
        assert_eq!(hunter.experience, 4);
        assert_eq!(hunter.attack_target, None);
        assert!(hunter.hostiles.is_empty());
        assert_eq!(world.creatures.find_creature(CreatureId(2)).map(|c| c.experience), Some(1));
        let items: Vec<_> = world
            .map
            .tile_at(at)
            .map(|tile| tile.items.iter().map(|item| item.type_id).collect())
            .unwrap_or_default();
        assert_eq!(items, vec![RAT_CORPSE, BLOOD_POOL]);
        assert!(world
            .sink
            .delivered_to(CreatureId(2))
            .iter()
            .any(|payload| matches!(payload, OutboundPayload::TileUpdate { item_count: 2, .. })));
    }

    #[test]
    fn player_death_tells_the_player() {
        let mut world = TestWorld::new();
        let mut victim = Creature::player(CreatureId(5), "Victim", Position::new(20, 20, 7));
        victim.health = 0;
        world.creatures.add_creature(victim);
        world.known.register(CreatureId(5));
        world.known.learn(CreatureId(5), CreatureId(9));
        let mut death = DeathOperation::new(CreatureId(5));
        world.execute(CreatureId(5), &mut death).expect("death");
        assert!(world.creatures.find_creature(CreatureId(5)).is_none());
        assert_eq!(world.known.client_count(), 0);
        assert!(world.scheduler.is_empty());
        let delivered = world.sink.delivered_to(CreatureId(5));
        assert!(matches!(
            &delivered[0],
            OutboundPayload::TextMessage { message_type: TextMessageType::EventAdvance, text } if text == "You are dead."
        ));
        assert!(matches!(delivered[2], OutboundPayload::PlayerDeath));
    }
}
