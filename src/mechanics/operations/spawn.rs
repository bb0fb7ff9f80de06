use crate::error::EventError;
use crate::mechanics::context::OperationContext;
use crate::mechanics::operations::movement::is_free_to_enter;
use crate::mechanics::operations::place_creature::PlaceCreatureOperation;
use crate::pathfinding::PathRequest;
use crate::scheduling::event::{EventType, Operation};
use crate::world::creatures::{CreatureFinder, CreatureId};
use crate::world::position::{Position, PositionDelta};
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// A monster home: `count` monsters of `race` living around `location`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Spawn {
    pub race: String,
    pub location: Position,
    pub radius: u16,
    pub count: u32,
    /// Seconds between top-ups; absent means the spawn fills once.
    #[serde(default)]
    pub regeneration_secs: Option<u64>,
}

impl Spawn {
    pub fn regeneration(&self) -> Option<Duration> {
        self.regeneration_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    fn live_members(&self, creatures: &(impl CreatureFinder + ?Sized)) -> u32 {
        let radius = u32::from(self.radius);
        let live = creatures
            .creatures()
            .filter(|creature| {
                !creature.is_dead()
                    && creature.race.as_deref() == Some(self.race.as_str())
                    && creature.position.z == self.location.z
                    && creature.position.max_distance_2d(self.location) <= radius
            })
            .count();
        u32::try_from(live).unwrap_or(u32::MAX)
    }
}

/// Fills a [`Spawn`] up to its count, then repeats on its regeneration timer.
#[derive(Debug, Clone)]
pub struct SpawnMonstersOperation {
    spawn: Spawn,
}

impl SpawnMonstersOperation {
    pub fn new(spawn: Spawn) -> Self {
        Self { spawn }
    }

    fn random_point(&self, ctx: &mut OperationContext<'_>) -> Position {
        let r = f64::from(self.spawn.radius / 4);
        let angle = f64::from(ctx.rng.gen_range(0u32..360)).to_radians();
        let delta = PositionDelta {
            dx: (r * angle.cos()).round() as i32,
            dy: (r * angle.sin()).round() as i32,
            dz: 0,
        };
        self.spawn.location.offset(delta).unwrap_or(self.spawn.location)
    }
}

impl Operation for SpawnMonstersOperation {
    fn event_type(&self) -> EventType {
        EventType::SPAWN_MONSTERS
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        ctx.repeat_after = self.spawn.regeneration();
        if ctx.monster_types.monster_type(&self.spawn.race).is_none() {
            warn!(race = %self.spawn.race, location = %self.spawn.location, "spawn names an unknown monster race");
            ctx.repeat_after = None;
            return Ok(());
        }
        let missing = self
            .spawn
            .count
            .saturating_sub(self.spawn.live_members(&*ctx.creatures));

        let mut claimed = Vec::new();
        for i in 0..missing {
            let point = self.random_point(ctx);
            let request = PathRequest::new(self.spawn.location, point)
                .with_max_steps((i + 1).saturating_mul(10));
            let found = ctx.find_path(&request).end_location;
            if claimed.contains(&found) || !is_free_to_enter(ctx, found) {
                debug!(race = %self.spawn.race, location = %found, "no room for spawned monster");
                continue;
            }
            claimed.push(found);
            ctx.schedule(
                CreatureId::SYSTEM,
                PlaceCreatureOperation::monster(self.spawn.race.clone(), found),
                Duration::ZERO,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanics::context::testing::{rat_type, TestWorld};
    use crate::world::creatures::{Creature, CreatureManager};

    fn rats(count: u32, regeneration_secs: Option<u64>) -> Spawn {
        Spawn {
            race: "rat".to_string(),
            location: Position::new(30, 30, 7),
            radius: 8,
            count,
            regeneration_secs,
        }
    }

    #[test]
    fn spawn_schedules_placements_near_its_centre() {
        let mut world = TestWorld::new();
        let mut spawn = SpawnMonstersOperation::new(rats(3, None));
        assert!(spawn.is_elevated());
        assert_eq!(world.execute(CreatureId::SYSTEM, &mut spawn).expect("spawn"), None);
        let placements = world
            .scheduler
            .pending_count_for(CreatureId::SYSTEM, EventType::PLACE_CREATURE);
        assert!((1..=3).contains(&placements));
    }

    #[test]
    fn regenerating_spawn_only_tops_up() {
        let mut world = TestWorld::new();
        let spawn_def = rats(2, Some(30));
        for (id, x) in [(100, 30), (101, 31)] {
            world
                .creatures
                .add_creature(Creature::monster(CreatureId(id), &rat_type(), Position::new(x, 30, 7)));
        }
        let mut spawn = SpawnMonstersOperation::new(spawn_def);
        let repeat = world.execute(CreatureId::SYSTEM, &mut spawn).expect("spawn");
        assert_eq!(repeat, Some(Duration::from_secs(30)));
        assert_eq!(world.scheduler.len(), 0);
    }

    #[test]
    fn unknown_race_stops_the_spawn() {
        let mut world = TestWorld::new();
        let mut spawn = SpawnMonstersOperation::new(Spawn {
            race: "wyrm".to_string(),
            ..rats(4, Some(10))
        });
        assert_eq!(world.execute(CreatureId::SYSTEM, &mut spawn).expect("spawn"), None);
        assert!(world.scheduler.is_empty());
    }
}
