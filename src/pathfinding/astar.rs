//! A* search over the tile map.
//!
//! Approach mode steers with the Manhattan distance to the target. When the
//! start is already inside the requested stand-off distance the heuristic is
//! inverted so the search walks outward. Either way a goal is any tile at
//! exactly the target distance with a clear line to the target.

use crate::pathfinding::node::{NodeFactory, NodeIndex, SearchContext, SearchScope};
use crate::world::creatures::CreatureId;
use crate::world::map::SpatialMap;
use crate::world::position::{Direction, Position, ALL_DIRECTIONS};
use rand::seq::SliceRandom;
use rand::RngCore;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

pub const DEFAULT_MAX_STEPS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    GoalFound,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRequest {
    pub start: Position,
    pub target: Position,
    pub on_behalf_of: Option<CreatureId>,
    /// `None` uses the finder's default.
    pub max_steps: Option<u32>,
    pub consider_avoids_as_blocking: bool,
    pub target_distance: u32,
    pub exclude_locations: Vec<Position>,
}

impl PathRequest {
    pub fn new(start: Position, target: Position) -> Self {
        Self {
            start,
            target,
            on_behalf_of: None,
            max_steps: None,
            consider_avoids_as_blocking: true,
            target_distance: 1,
            exclude_locations: Vec::new(),
        }
    }

    pub fn on_behalf_of(mut self, creature: CreatureId) -> Self {
        self.on_behalf_of = Some(creature);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_target_distance(mut self, target_distance: u32) -> Self {
        self.target_distance = target_distance;
        self
    }

    pub fn walking_through_avoids(mut self) -> Self {
        self.consider_avoids_as_blocking = false;
        self
    }

    pub fn excluding(mut self, locations: impl IntoIterator<Item = Position>) -> Self {
        self.exclude_locations.extend(locations);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOutcome {
    pub state: SearchState,
    /// Where the path ends; on failure, the last tile the search expanded.
    pub end_location: Position,
    pub directions: Vec<Direction>,
}

impl PathOutcome {
    fn trivial(start: Position) -> Self {
        Self {
            state: SearchState::GoalFound,
            end_location: start,
            directions: Vec::new(),
        }
    }

    pub fn found(&self) -> bool {
        self.state == SearchState::GoalFound
    }
}

pub trait PathFinder: Send + Sync {
    fn find_between(
        &self,
        map: &dyn SpatialMap,
        request: &PathRequest,
        rng: &mut dyn RngCore,
    ) -> PathOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    total_cost: i64,
    estimated_cost: i64,
    sequence: u64,
    index: NodeIndex,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap: lowest f, then lowest h, then oldest.
        other
            .total_cost
            .cmp(&self.total_cost)
            .then_with(|| other.estimated_cost.cmp(&self.estimated_cost))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct AStarPathFinder {
    node_factory: NodeFactory,
    default_max_steps: u32,
}

impl AStarPathFinder {
    pub fn new(default_max_steps: u32) -> Self {
        Self {
            node_factory: NodeFactory::new(),
            default_max_steps: if default_max_steps == 0 {
                DEFAULT_MAX_STEPS
            } else {
                default_max_steps
            },
        }
    }

    pub fn node_factory(&self) -> &NodeFactory {
        &self.node_factory
    }

    fn search(
        &self,
        scope: &SearchScope<'_>,
        context: &SearchContext<'_>,
        start: NodeIndex,
        max_steps: u32,
        rng: &mut dyn RngCore,
    ) -> PathOutcome {
        let mut open = BinaryHeap::new();
        let mut sequence = 0u64;
        let Some((total_cost, estimated_cost, start_position)) = scope.update(start, |node| {
            node.movement_cost = 0;
            node.should_be_visited = true;
            (node.total_cost(), node.estimated_cost, node.position)
        }) else {
            return PathOutcome::trivial(context.target);
        };
        open.push(OpenEntry {
            total_cost,
            estimated_cost,
            sequence,
            index: start,
        });

        let mut last_expanded = start_position;
        let mut steps = 0u32;
        let mut directions = ALL_DIRECTIONS;

        while let Some(entry) = open.pop() {
            let Some(current) = scope.node(entry.index) else {
                continue;
            };
            if current.has_been_visited || entry.total_cost != current.total_cost() {
                continue;
            }
            if context.is_goal(current.position) {
                return self.reconstruct(scope, entry.index, current.position);
            }
            if steps >= max_steps {
                break;
            }
            steps += 1;
            scope.update(entry.index, |node| {
                node.has_been_visited = true;
                node.should_be_visited = false;
            });
            last_expanded = current.position;

            directions.shuffle(&mut *rng);
            for direction in directions {
                let Some(position) = current.position.step(direction) else {
                    continue;
                };
                if !context.is_walkable(position) {
                    continue;
                }
                let Some(index) = scope.create(context, position) else {
                    continue;
                };
                let improved = scope
                    .update(index, |node| {
                        if node.has_been_visited || !node.relax(entry.index, &current) {
                            return None;
                        }
                        node.should_be_visited = true;
                        Some((node.total_cost(), node.estimated_cost))
                    })
                    .flatten();
                if let Some((total_cost, estimated_cost)) = improved {
                    sequence += 1;
                    open.push(OpenEntry {
                        total_cost,
                        estimated_cost,
                        sequence,
                        index,
                    });
                }
            }
        }

        PathOutcome {
            state: SearchState::Failed,
            end_location: last_expanded,
            directions: Vec::new(),
        }
    }

    fn reconstruct(&self, scope: &SearchScope<'_>, goal: NodeIndex, goal_position: Position) -> PathOutcome {
        let mut positions = vec![goal_position];
        let mut cursor = scope.node(goal).and_then(|node| node.parent);
        while let Some(index) = cursor {
            let Some(node) = scope.node(index) else {
                break;
            };
            positions.push(node.position);
            cursor = node.parent;
        }
        positions.reverse();
        let directions = positions
            .windows(2)
            .filter_map(|pair| pair[0].direction_to(pair[1]))
            .collect();
        PathOutcome {
            state: SearchState::GoalFound,
            end_location: goal_position,
            directions,
        }
    }
}

impl PathFinder for AStarPathFinder {
    fn find_between(
        &self,
        map: &dyn SpatialMap,
        request: &PathRequest,
        rng: &mut dyn RngCore,
    ) -> PathOutcome {
        let max_steps = match request.max_steps {
            Some(0) | None => self.default_max_steps,
            Some(steps) => steps,
        };
        let scope = self.node_factory.begin_search();
        let context = SearchContext {
            search_id: scope.search_id(),
            map,
            on_behalf_of: request.on_behalf_of,
            consider_avoids_as_blocking: request.consider_avoids_as_blocking,
            target: request.target,
            target_distance: request.target_distance,
            move_away: request.start.max_distance_2d(request.target) < request.target_distance,
            exclude_locations: request.exclude_locations.iter().copied().collect(),
        };

        let start = scope.create(&context, request.start);
        let target_exists = map.has_tile_at(request.target);
        let start = match start {
            Some(start) if target_exists && request.start != request.target => start,
            _ => return PathOutcome::trivial(request.start),
        };

        let outcome = self.search(&scope, &context, start, max_steps, rng);
        if outcome.state == SearchState::Failed {
            debug!(
                search_id = %scope.search_id(),
                start = %request.start,
                target = %request.target,
                end = %outcome.end_location,
                max_steps,
                "no path found"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::map::{Map, Tile};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn open_map() -> Map {
        Map::open_floor("test", 30, 30, 7, 150)
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn straight_line_towards_the_target() {
        let map = open_map();
        let finder = AStarPathFinder::new(DEFAULT_MAX_STEPS);
        let request = PathRequest::new(Position::new(0, 0, 7), Position::new(5, 0, 7));
        let outcome = finder.find_between(&map, &request, &mut rng());
        assert_eq!(outcome.state, SearchState::GoalFound);
        assert_eq!(outcome.directions, vec![Direction::East; 4]);
        assert_eq!(outcome.end_location, Position::new(4, 0, 7));
    }

    #[test]
    fn same_start_and_target_is_trivially_found() {
        let map = open_map();
        let finder = AStarPathFinder::new(DEFAULT_MAX_STEPS);
        let here = Position::new(3, 3, 7);
        let outcome = finder.find_between(&map, &PathRequest::new(here, here), &mut rng());
        assert_eq!(outcome, PathOutcome::trivial(here));
        assert_eq!(finder.node_factory().cached_searches(), 0);
    }

    #[test]
    fn missing_endpoint_is_trivially_found() {
        let map = open_map();
        let finder = AStarPathFinder::new(DEFAULT_MAX_STEPS);
        let start = Position::new(3, 3, 7);
        let outcome = finder.find_between(
            &map,
            &PathRequest::new(start, Position::new(300, 3, 7)),
            &mut rng(),
        );
        assert!(outcome.found());
        assert!(outcome.directions.is_empty());
        assert_eq!(outcome.end_location, start);
    }

    #[test]
    fn enclosed_target_fails_at_the_last_reached_tile() {
        let mut map = open_map();
        let target = Position::new(20, 20, 7);
        for direction in ALL_DIRECTIONS {
            map.block(target.step(direction).expect("ring"));
        }
        let finder = AStarPathFinder::new(DEFAULT_MAX_STEPS);
        let request = PathRequest::new(Position::new(2, 2, 7), target).with_max_steps(10);
        let outcome = finder.find_between(&map, &request, &mut rng());
        assert_eq!(outcome.state, SearchState::Failed);
        assert_ne!(outcome.end_location, target);
        assert!(map
            .tile_at(outcome.end_location)
            .map(|tile| !tile.is_path_blocking())
            .unwrap_or(false));
        assert!(outcome.directions.is_empty());
        assert_eq!(finder.node_factory().live_node_count(), 0);
    }

    #[test]
    fn capped_search_ends_on_the_last_expanded_corridor_tile() {
        let mut map = Map::new("corridor");
        for x in 0..=30 {
            map.insert_tile(Tile::ground(Position::new(x, 5, 7), 150));
        }
        let target = Position::new(40, 5, 7);
        map.insert_tile(Tile::ground(target, 150));

        let finder = AStarPathFinder::new(DEFAULT_MAX_STEPS);
        let request = PathRequest::new(Position::new(0, 5, 7), target).with_max_steps(10);
        let outcome = finder.find_between(&map, &request, &mut rng());
        assert_eq!(outcome.state, SearchState::Failed);
        assert_eq!(outcome.end_location, Position::new(9, 5, 7));
        assert!(outcome.directions.is_empty());
    }

    #[test]
    fn sealed_start_exhausts_the_open_set() {
        let mut map = open_map();
        let start = Position::new(5, 5, 7);
        for direction in ALL_DIRECTIONS {
            map.block(start.step(direction).expect("ring"));
        }
        let finder = AStarPathFinder::new(DEFAULT_MAX_STEPS);
        let outcome = finder.find_between(
            &map,
            &PathRequest::new(start, Position::new(15, 15, 7)),
            &mut rng(),
        );
        assert_eq!(outcome.state, SearchState::Failed);
        assert_eq!(outcome.end_location, start);
    }

    #[test]
    fn retreats_when_inside_the_stand_off_distance() {
        let map = open_map();
        let finder = AStarPathFinder::new(DEFAULT_MAX_STEPS);
        let target = Position::new(15, 15, 7);
        let request = PathRequest::new(Position::new(16, 15, 7), target).with_target_distance(3);
        let outcome = finder.find_between(&map, &request, &mut rng());
        assert!(outcome.found());
        assert_eq!(outcome.end_location.max_distance_2d(target), 3);
        assert!(!outcome.directions.is_empty());
    }

    #[test]
    fn walks_around_walls() {
        let mut map = open_map();
        for y in 0..8 {
            map.block(Position::new(5, y, 7));
        }
        let finder = AStarPathFinder::new(DEFAULT_MAX_STEPS);
        let request = PathRequest::new(Position::new(2, 2, 7), Position::new(8, 2, 7));
        let outcome = finder.find_between(&map, &request, &mut rng());
        assert!(outcome.found());
        let mut at = Position::new(2, 2, 7);
        for direction in &outcome.directions {
            at = at.step(*direction).expect("on map");
            assert!(!map.tile_at(at).map(|t| t.is_path_blocking()).unwrap_or(true));
        }
        assert_eq!(at, outcome.end_location);
        assert_eq!(at.max_distance_2d(Position::new(8, 2, 7)), 1);
    }

    #[test]
    fn excluded_locations_are_never_the_goal() {
        let map = open_map();
        let finder = AStarPathFinder::new(DEFAULT_MAX_STEPS);
        let request = PathRequest::new(Position::new(0, 0, 7), Position::new(5, 0, 7))
            .excluding([Position::new(4, 0, 7)]);
        let outcome = finder.find_between(&map, &request, &mut rng());
        assert!(outcome.found());
        assert_ne!(outcome.end_location, Position::new(4, 0, 7));
    }

    #[test]
    fn same_seed_gives_the_same_route() {
        let map = open_map();
        let finder = AStarPathFinder::new(DEFAULT_MAX_STEPS);
        let request = PathRequest::new(Position::new(1, 1, 7), Position::new(9, 12, 7));
        let first = finder.find_between(&map, &request, &mut ChaCha8Rng::seed_from_u64(99));
        let second = finder.find_between(&map, &request, &mut ChaCha8Rng::seed_from_u64(99));
        assert_eq!(first, second);
    }
}
