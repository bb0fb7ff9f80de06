use crate::world::creatures::CreatureId;
use crate::world::map::SpatialMap;
use crate::world::position::Position;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchId(pub u64);

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search#{}", self.0)
    }
}

/// Parameters of one pathfinding invocation. Never changes once built.
pub struct SearchContext<'a> {
    pub search_id: SearchId,
    pub map: &'a dyn SpatialMap,
    pub on_behalf_of: Option<CreatureId>,
    pub consider_avoids_as_blocking: bool,
    pub target: Position,
    pub target_distance: u32,
    /// The start is already inside the stand-off distance; look for somewhere to retreat to.
    pub move_away: bool,
    pub exclude_locations: HashSet<Position>,
}

impl SearchContext<'_> {
    /// Orthogonal steps cost 1, diagonal steps 3.
    pub fn step_cost(from: Position, to: Position) -> i64 {
        if from.x != to.x && from.y != to.y {
            3
        } else {
            1
        }
    }

    pub fn estimate(&self, position: Position) -> i64 {
        let delta = position.delta_from(self.target);
        let (dx, dy) = (i64::from(delta.dx.abs()), i64::from(delta.dy.abs()));
        if self.move_away {
            let distance = i64::from(self.target_distance);
            (distance - dx) + (distance - dy)
        } else {
            dx + dy
        }
    }

    pub fn is_goal(&self, position: Position) -> bool {
        !self.exclude_locations.contains(&position)
            && position.z == self.target.z
            && position.max_distance_2d(self.target) == self.target_distance
            && self.map.can_throw_between(position, self.target)
    }

    pub fn is_walkable(&self, position: Position) -> bool {
        self.map
            .tile_at(position)
            .map(|tile| !tile.blocks_for(self.consider_avoids_as_blocking))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub position: Position,
    /// g; only ever lowered once set.
    pub movement_cost: i64,
    /// h
    pub estimated_cost: i64,
    pub parent: Option<NodeIndex>,
    pub should_be_visited: bool,
    pub has_been_visited: bool,
}

impl Node {
    fn new(position: Position, estimated_cost: i64) -> Self {
        Self {
            position,
            movement_cost: i64::MAX,
            estimated_cost,
            parent: None,
            should_be_visited: false,
            has_been_visited: false,
        }
    }

    pub fn total_cost(&self) -> i64 {
        self.movement_cost.saturating_add(self.estimated_cost)
    }

    pub fn has_movement_cost(&self) -> bool {
        self.movement_cost != i64::MAX
    }

    /// Lowers g when reached more cheaply through `parent`. Returns whether it changed.
    pub fn relax(&mut self, parent: NodeIndex, parent_node: &Node) -> bool {
        let candidate = parent_node
            .movement_cost
            .saturating_add(SearchContext::step_cost(parent_node.position, self.position));
        if candidate < self.movement_cost {
            self.movement_cost = candidate;
            self.parent = Some(parent);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default)]
struct SearchArena {
    nodes: Vec<Node>,
    by_position: HashMap<Position, NodeIndex>,
}

/// Hands out nodes memoized per (search, location).
///
/// Searches may finish on one thread while another starts, so the cache sits
/// behind a lock. Every search must end with [`NodeFactory::on_search_completed`];
/// [`SearchScope`] does that on drop.
#[derive(Debug, Default)]
pub struct NodeFactory {
    searches: Mutex<HashMap<SearchId, SearchArena>>,
    next_search: AtomicU64,
}

impl NodeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_search(&self) -> SearchScope<'_> {
        let search_id = SearchId(self.next_search.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock().entry(search_id).or_default();
        trace!(%search_id, "search started");
        SearchScope {
            factory: self,
            search_id,
        }
    }

    /// Returns the node for `position`, creating it on first request.
    /// `None` when no tile exists there.
    pub fn create(&self, context: &SearchContext<'_>, position: Position) -> Option<NodeIndex> {
        if !context.map.has_tile_at(position) {
            return None;
        }
        let mut searches = self.lock();
        let arena = searches.entry(context.search_id).or_default();
        if let Some(index) = arena.by_position.get(&position) {
            return Some(*index);
        }
        let index = NodeIndex(arena.nodes.len());
        arena
            .nodes
            .push(Node::new(position, context.estimate(position)));
        arena.by_position.insert(position, index);
        Some(index)
    }

    pub fn node(&self, search_id: SearchId, index: NodeIndex) -> Option<Node> {
        self.lock()
            .get(&search_id)
            .and_then(|arena| arena.nodes.get(index.0).copied())
    }

    pub fn update<R>(
        &self,
        search_id: SearchId,
        index: NodeIndex,
        apply: impl FnOnce(&mut Node) -> R,
    ) -> Option<R> {
        self.lock()
            .get_mut(&search_id)
            .and_then(|arena| arena.nodes.get_mut(index.0))
            .map(apply)
    }

    /// Releases everything cached for `search_id`. Returns how many nodes were dropped.
    pub fn on_search_completed(&self, search_id: SearchId) -> usize {
        let released = self
            .lock()
            .remove(&search_id)
            .map(|arena| arena.nodes.len())
            .unwrap_or(0);
        trace!(%search_id, released, "search completed");
        released
    }

    pub fn cached_searches(&self) -> usize {
        self.lock().len()
    }

    pub fn live_node_count(&self) -> usize {
        self.lock().values().map(|arena| arena.nodes.len()).sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SearchId, SearchArena>> {
        self.searches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One search's claim on the node cache; released exactly once, on drop.
pub struct SearchScope<'f> {
    factory: &'f NodeFactory,
    search_id: SearchId,
}

impl SearchScope<'_> {
    pub fn search_id(&self) -> SearchId {
        self.search_id
    }

    pub fn create(&self, context: &SearchContext<'_>, position: Position) -> Option<NodeIndex> {
        self.factory.create(context, position)
    }

    pub fn node(&self, index: NodeIndex) -> Option<Node> {
        self.factory.node(self.search_id, index)
    }

    pub fn update<R>(&self, index: NodeIndex, apply: impl FnOnce(&mut Node) -> R) -> Option<R> {
        self.factory.update(self.search_id, index, apply)
    }
}

impl Drop for SearchScope<'_> {
    fn drop(&mut self) {
        self.factory.on_search_completed(self.search_id);
    }
}
