pub mod astar;
pub mod node;
pub mod walk_plan;

pub use astar::{AStarPathFinder, PathFinder, PathOutcome, PathRequest, SearchState};
pub use walk_plan::{GoalLocationProvider, WalkPlan, WalkPlanState, WalkStrategy};
