//! Per-creature route tracking.
//!
//! A plan holds the locations a creature still has to step on, front first.
//! The auto-walk orchestrator calls [`WalkPlan::checkpoint`] every time it
//! runs and re-plans through the pathfinder whenever the plan reports
//! [`WalkPlanState::NeedsToRecalculate`].

use crate::world::creatures::CreatureId;
use crate::world::position::{Direction, Position};
use std::collections::VecDeque;
use std::time::Duration;

pub const DEFAULT_WAIT_TIME: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkPlanState {
    OnTrack,
    NeedsToRecalculate,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStrategy {
    /// The goal never moves; an emptied plan means the walk is over.
    Static,
    /// The goal can move (following, chasing); an emptied plan waits and re-checks.
    Dynamic,
}

impl WalkStrategy {
    pub fn is_static(self) -> bool {
        matches!(self, WalkStrategy::Static)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalLocationProvider {
    Fixed(Position),
    Creature(CreatureId),
}

#[derive(Debug, Clone)]
pub struct WalkPlan {
    waypoints: VecDeque<Position>,
    state: WalkPlanState,
    strategy: WalkStrategy,
    goal: GoalLocationProvider,
    goal_target_distance: u32,
    wait_time: Duration,
    last_checkpoint: Option<Position>,
    planned_goal_location: Option<Position>,
}

impl WalkPlan {
    /// A plan towards `goal` with no route yet; the first checkpoint asks for one.
    pub fn towards(
        goal: GoalLocationProvider,
        strategy: WalkStrategy,
        goal_target_distance: u32,
    ) -> Self {
        Self {
            waypoints: VecDeque::new(),
            state: WalkPlanState::NeedsToRecalculate,
            strategy,
            goal,
            goal_target_distance,
            wait_time: DEFAULT_WAIT_TIME,
            last_checkpoint: None,
            planned_goal_location: None,
        }
    }

    /// A static plan following client-supplied directions from `start`.
    pub fn from_directions(start: Position, directions: &[Direction]) -> Self {
        let mut plan = Self::towards(GoalLocationProvider::Fixed(start), WalkStrategy::Static, 0);
        plan.recalculate_waypoints(start, directions);
        if let Some(last) = plan.waypoints.back().copied() {
            plan.goal = GoalLocationProvider::Fixed(last);
            plan.planned_goal_location = Some(last);
        }
        plan
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    pub fn state(&self) -> WalkPlanState {
        self.state
    }

    pub fn strategy(&self) -> WalkStrategy {
        self.strategy
    }

    pub fn goal(&self) -> GoalLocationProvider {
        self.goal
    }

    pub fn goal_target_distance(&self) -> u32 {
        self.goal_target_distance
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    pub fn waypoints(&self) -> &VecDeque<Position> {
        &self.waypoints
    }

    pub fn next_waypoint(&self) -> Option<Position> {
        self.waypoints.front().copied()
    }

    pub fn directions(&self) -> Vec<Direction> {
        let mut from = match self.last_checkpoint {
            Some(position) => position,
            None => return Vec::new(),
        };
        let mut directions = Vec::with_capacity(self.waypoints.len());
        for waypoint in &self.waypoints {
            if let Some(direction) = from.direction_to(*waypoint) {
                directions.push(direction);
            }
            from = *waypoint;
        }
        directions
    }

    /// Records the mover's location, consuming the front waypoint on arrival.
    ///
    /// Standing still where the last checkpoint was seen is not drift: the
    /// scheduled step may simply not have run yet.
    pub fn checkpoint(&mut self, current: Position) {
        if self.state == WalkPlanState::Aborted {
            return;
        }
        match self.waypoints.front().copied() {
            Some(next) if next == current => {
                self.waypoints.pop_front();
            }
            Some(_) if self.last_checkpoint == Some(current) => {}
            Some(_) => self.state = WalkPlanState::NeedsToRecalculate,
            None => {}
        }
        self.last_checkpoint = Some(current);
    }

    /// Flags a dynamic plan for re-planning when its goal has moved.
    pub fn observe_goal(&mut self, goal_location: Option<Position>) {
        if self.state == WalkPlanState::Aborted || self.strategy.is_static() {
            return;
        }
        match goal_location {
            None => self.abort(),
            Some(location) if self.planned_goal_location != Some(location) => {
                self.state = WalkPlanState::NeedsToRecalculate;
            }
            Some(_) => {}
        }
    }

    /// Replaces the route wholesale with the steps from `current`.
    pub fn recalculate_waypoints(&mut self, current: Position, directions: &[Direction]) {
        self.waypoints = Self::expand(current, directions);
        self.last_checkpoint = Some(current);
        self.state = WalkPlanState::OnTrack;
    }

    /// Records the goal location a fresh route was computed against.
    pub fn planned_against(&mut self, goal_location: Position) {
        self.planned_goal_location = Some(goal_location);
    }

    /// A stop-gap step taken after a failed search; the plan still wants a real route.
    pub fn fallback_step(&mut self, current: Position, direction: Direction) {
        self.waypoints = Self::expand(current, &[direction]);
        self.last_checkpoint = Some(current);
        self.state = WalkPlanState::NeedsToRecalculate;
    }

    /// The route turned out unusable (e.g. a step was refused); re-plan next time.
    pub fn invalidate(&mut self) {
        if self.state != WalkPlanState::Aborted {
            self.state = WalkPlanState::NeedsToRecalculate;
        }
    }

    pub fn abort(&mut self) {
        self.waypoints.clear();
        self.state = WalkPlanState::Aborted;
    }

    pub fn is_exhausted(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Delay before the orchestrator should look again, if it should at all.
    pub fn next_recheck(&self) -> Option<Duration> {
        if self.state != WalkPlanState::Aborted
            && self.waypoints.is_empty()
            && !self.strategy.is_static()
        {
            Some(self.wait_time)
        } else {
            None
        }
    }

    fn expand(start: Position, directions: &[Direction]) -> VecDeque<Position> {
        let mut waypoints = VecDeque::with_capacity(directions.len());
        let mut at = start;
        for direction in directions {
            match at.step(*direction) {
                Some(next) => {
                    waypoints.push_back(next);
                    at = next;
                }
                None => break,
            }
        }
        waypoints
    }
}
