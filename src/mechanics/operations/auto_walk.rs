use crate::error::EventError;
use crate::mechanics::context::OperationContext;
use crate::mechanics::operations::movement::{is_free_to_enter, MovementOperation};
use crate::notifications::kinds::PlayerNotification;
use crate::notifications::{OutboundPayload, TextMessageType};
use crate::pathfinding::{GoalLocationProvider, PathRequest, WalkPlan, WalkPlanState};
use crate::scheduling::event::{EventType, Operation};
use crate::scheduling::exhaustion::ExhaustionCategory;
use crate::world::creatures::{ChaseMode, CreatureFinder, CreatureId, DEFAULT_GROUND_SPEED};
use crate::world::position::{Direction, Position, ALL_DIRECTIONS};
use rand::seq::SliceRandom;
use tracing::debug;

/// Cost multiplier applied to the step after a blind fallback step.
const FALLBACK_STEP_COST_MODIFIER: u32 = 3;

/// Keeps a creature walking along its [`WalkPlan`], one step per run.
///
/// Each run reconciles the plan with where the creature actually is,
/// re-plans through the pathfinder when asked to, schedules the next
/// [`MovementOperation`] and asks to run again once that step is done.
#[derive(Debug, Clone)]
pub struct AutoWalkOrchestratorOperation {
    creature: CreatureId,
    new_plan: Option<PendingPlan>,
}

#[derive(Debug, Clone)]
enum PendingPlan {
    Ready(WalkPlan),
    /// Client directions, laid out from wherever the creature stands when the walk starts.
    Directions(Vec<Direction>),
}

impl AutoWalkOrchestratorOperation {
    /// Continues whatever plan the creature already carries.
    pub fn new(creature: CreatureId) -> Self {
        Self {
            creature,
            new_plan: None,
        }
    }

    /// Installs `plan` on the creature on the first run, replacing any old one.
    pub fn with_plan(creature: CreatureId, plan: WalkPlan) -> Self {
        Self {
            creature,
            new_plan: Some(PendingPlan::Ready(plan)),
        }
    }

    /// Walks `directions` starting from the creature's position on the first run.
    pub fn along(creature: CreatureId, directions: Vec<Direction>) -> Self {
        Self {
            creature,
            new_plan: Some(PendingPlan::Directions(directions)),
        }
    }

    fn goal_location(ctx: &OperationContext<'_>, goal: GoalLocationProvider) -> Option<Position> {
        match goal {
            GoalLocationProvider::Fixed(position) => Some(position),
            GoalLocationProvider::Creature(id) => ctx
                .creatures
                .find_creature(id)
                .filter(|creature| !creature.is_dead())
                .map(|creature| creature.position),
        }
    }

    fn random_free_direction(ctx: &mut OperationContext<'_>, from: Position) -> Option<Direction> {
        let mut directions = ALL_DIRECTIONS.to_vec();
        directions.shuffle(&mut *ctx.rng);
        directions.into_iter().find(|direction| {
            from.step(*direction)
                .map(|to| is_free_to_enter(&*ctx, to))
                .unwrap_or(false)
        })
    }
}

impl Operation for AutoWalkOrchestratorOperation {
    fn event_type(&self) -> EventType {
        EventType::AUTO_WALK
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        let creature = ctx
            .creatures
            .find_creature_mut(self.creature)
            .ok_or(EventError::CreatureNotFound(self.creature))?;
        match self.new_plan.take() {
            Some(PendingPlan::Ready(plan)) => creature.walk_plan = Some(plan),
            Some(PendingPlan::Directions(directions)) => {
                creature.walk_plan = Some(WalkPlan::from_directions(creature.position, &directions));
            }
            None => {}
        }
        if creature.is_dead() || !creature.can_walk() {
            return Ok(());
        }
        let Some(mut plan) = creature.walk_plan.take() else {
            return Ok(());
        };
        let position = creature.position;
        let facing = creature.direction;
        let is_player = creature.is_player();

        plan.checkpoint(position);
        let goal_location = Self::goal_location(ctx, plan.goal());
        plan.observe_goal(goal_location);

        if plan.state() == WalkPlanState::NeedsToRecalculate {
            if let Some(goal) = goal_location {
                let request = PathRequest::new(position, goal)
                    .on_behalf_of(self.creature)
                    .with_max_steps(ctx.settings.default_max_steps)
                    .with_target_distance(plan.goal_target_distance());
                let outcome = ctx.find_path(&request);
                if outcome.found() {
                    plan.recalculate_waypoints(position, &outcome.directions);
                    plan.planned_against(goal);
                } else if is_player {
                    debug!(creature = %self.creature, goal = %goal, "no way to walk goal");
                    plan.abort();
                    ctx.notify(PlayerNotification::text(
                        self.creature,
                        TextMessageType::StatusSmall,
                        "There is no way.",
                    ));
                    if let Some(creature) = ctx.creatures.find_creature_mut(self.creature) {
                        creature.chase_mode = ChaseMode::Stand;
                        creature.attack_target = None;
                    }
                } else if let Some(direction) = Self::random_free_direction(ctx, position) {
                    plan.fallback_step(position, direction);
                    if let Some(creature) = ctx.creatures.find_creature_mut(self.creature) {
                        creature.last_movement_cost_modifier = FALLBACK_STEP_COST_MODIFIER;
                    }
                }
            }
        }

        if plan.state() == WalkPlanState::Aborted {
            if is_player {
                ctx.notify(PlayerNotification::new(
                    self.creature,
                    vec![OutboundPayload::PlayerCancelWalk {
                        direction: facing.client_safe(),
                    }],
                ));
            }
            return self.store(ctx, plan);
        }

        let Some(next) = plan.next_waypoint() else {
            ctx.repeat_after = plan.next_recheck();
            return self.store(ctx, plan);
        };

        let delay = ctx.remaining_exhaustion(self.creature, ExhaustionCategory::Movement);
        ctx.schedule(self.creature, MovementOperation::new(self.creature, position, next), delay);

        let ground_speed = ctx
            .map
            .tile_at(position)
            .map(|tile| tile.ground_speed)
            .unwrap_or(DEFAULT_GROUND_SPEED);
        let step = position.direction_to(next).and_then(|direction| {
            ctx.creatures
                .find_creature(self.creature)
                .map(|creature| creature.step_duration(ground_speed, direction))
        });
        ctx.repeat_after = step.map(|step| step + delay);
        self.store(ctx, plan)
    }
}

impl AutoWalkOrchestratorOperation {
    fn store(&self, ctx: &mut OperationContext<'_>, plan: WalkPlan) -> Result<(), EventError> {
        let creature = ctx
            .creatures
            .find_creature_mut(self.creature)
            .ok_or(EventError::CreatureNotFound(self.creature))?;
        creature.walk_plan = Some(plan);
        Ok(())
    }
}
