use crate::world::creatures::{CreatureFinder, CreatureId};
use crate::world::items::Item;
use crate::world::position::Position;
use crate::world::viewport::Viewport;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileFlags {
    pub blocks_path: bool,
    pub blocks_projectiles: bool,
    /// Fields and similar things creatures prefer to walk around.
    pub avoid: bool,
    pub protection_zone: bool,
    pub no_logout: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub position: Position,
    pub ground_speed: u16,
    pub flags: TileFlags,
    pub items: Vec<Item>,
}

impl Tile {
    pub fn ground(position: Position, ground_speed: u16) -> Self {
        Self {
            position,
            ground_speed,
            flags: TileFlags::default(),
            items: Vec::new(),
        }
    }

    pub fn is_path_blocking(&self) -> bool {
        self.flags.blocks_path
    }

    pub fn blocks_for(&self, consider_avoids_as_blocking: bool) -> bool {
        self.is_path_blocking() || (consider_avoids_as_blocking && self.flags.avoid)
    }
}

/// Spatial queries the mechanics need from the world map.
pub trait SpatialMap: Send + Sync {
    fn tile_at(&self, position: Position) -> Option<&Tile>;

    fn tile_at_mut(&mut self, position: Position) -> Option<&mut Tile>;

    fn has_tile_at(&self, position: Position) -> bool {
        self.tile_at(position).is_some()
    }

    /// Whether a projectile thrown from `from` reaches `to` unobstructed.
    fn can_throw_between(&self, from: Position, to: Position) -> bool {
        if from.z != to.z {
            return false;
        }
        line_between(from, to).into_iter().all(|position| {
            position == from
                || position == to
                || self
                    .tile_at(position)
                    .map(|tile| !tile.flags.blocks_projectiles)
                    .unwrap_or(false)
        })
    }

    fn players_that_can_see(
        &self,
        location: Position,
        creatures: &dyn CreatureFinder,
    ) -> Vec<CreatureId> {
        let mut players: Vec<CreatureId> = creatures
            .creatures()
            .filter(|creature| creature.is_player() && Viewport::can_see(creature.position, location))
            .map(|creature| creature.id)
            .collect();
        players.sort();
        players
    }

    fn add_item(&mut self, position: Position, item: Item) -> bool {
        match self.tile_at_mut(position) {
            Some(tile) => {
                tile.items.push(item);
                true
            }
            None => false,
        }
    }
}

/// Tiles crossed by a straight line, both ends included (Bresenham).
pub fn line_between(from: Position, to: Position) -> Vec<Position> {
    let (mut x, mut y) = (i32::from(from.x), i32::from(from.y));
    let (x1, y1) = (i32::from(to.x), i32::from(to.y));
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut line = Vec::with_capacity((dx - dy + 1) as usize);
    loop {
        line.push(Position {
            x: x as u16,
            y: y as u16,
            z: from.z,
        });
        if x == x1 && y == y1 {
            break;
        }
        let doubled = 2 * err;
        if doubled >= dy {
            err += dy;
            x += sx;
        }
        if doubled <= dx {
            err += dx;
            y += sy;
        }
    }
    line
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Map {
    pub name: String,
    pub tiles: HashMap<Position, Tile>,
}

impl Map {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tiles: HashMap::new(),
        }
    }

    /// A rectangle of walkable ground on one floor, `(0,0)` to `(width-1,height-1)`.
    pub fn open_floor(name: &str, width: u16, height: u16, z: u8, ground_speed: u16) -> Self {
        let mut map = Self::new(name);
        for x in 0..width {
            for y in 0..height {
                let position = Position { x, y, z };
                map.tiles.insert(position, Tile::ground(position, ground_speed));
            }
        }
        map
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn insert_tile(&mut self, tile: Tile) {
        self.tiles.insert(tile.position, tile);
    }

    pub fn remove_tile(&mut self, position: Position) -> Option<Tile> {
        self.tiles.remove(&position)
    }

    /// Makes a tile a wall: impassable and opaque to projectiles.
    pub fn block(&mut self, position: Position) {
        if let Some(tile) = self.tiles.get_mut(&position) {
            tile.flags.blocks_path = true;
            tile.flags.blocks_projectiles = true;
        }
    }

    pub fn set_avoid(&mut self, position: Position, avoid: bool) {
        if let Some(tile) = self.tiles.get_mut(&position) {
            tile.flags.avoid = avoid;
        }
    }
}

impl SpatialMap for Map {
    fn tile_at(&self, position: Position) -> Option<&Tile> {
        self.tiles.get(&position)
    }

    fn tile_at_mut(&mut self, position: Position) -> Option<&mut Tile> {
        self.tiles.get_mut(&position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::creatures::{Creature, CreatureManager, CreatureRegistry};
    use crate::world::items::{ItemId, ItemTypeId};

    #[test]
    fn open_floor_covers_the_rectangle() {
        let map = Map::open_floor("test", 4, 3, 7, 150);
        assert_eq!(map.tile_count(), 12);
        assert!(map.has_tile_at(Position::new(3, 2, 7)));
        assert!(!map.has_tile_at(Position::new(4, 2, 7)));
        assert!(!map.has_tile_at(Position::new(0, 0, 6)));
    }

    #[test]
    fn line_includes_both_ends() {
        let line = line_between(Position::new(0, 0, 7), Position::new(3, 1, 7));
        assert_eq!(line.first(), Some(&Position::new(0, 0, 7)));
        assert_eq!(line.last(), Some(&Position::new(3, 1, 7)));
        assert_eq!(line.len(), 4);
        assert_eq!(
            line_between(Position::new(2, 2, 7), Position::new(2, 2, 7)),
            vec![Position::new(2, 2, 7)]
        );
    }

    #[test]
    fn walls_block_throwing_but_floors_do_not() {
        let mut map = Map::open_floor("test", 10, 10, 7, 150);
        let from = Position::new(1, 5, 7);
        let to = Position::new(8, 5, 7);
        assert!(map.can_throw_between(from, to));
        map.block(Position::new(4, 5, 7));
        assert!(!map.can_throw_between(from, to));
        assert!(!map.can_throw_between(from, Position::new(1, 5, 6)));
    }

    #[test]
    fn only_players_in_view_are_spectators() {
        let map = Map::open_floor("test", 50, 50, 7, 150);
        let mut creatures = CreatureRegistry::new();
        creatures.add_creature(Creature::player(CreatureId(1), "Near", Position::new(10, 10, 7)));
        creatures.add_creature(Creature::player(CreatureId(2), "Far", Position::new(40, 40, 7)));
        let mut rat = Creature::player(CreatureId(3), "Rat", Position::new(11, 10, 7));
        rat.kind = crate::world::creatures::CreatureKind::Monster;
        creatures.add_creature(rat);
        assert_eq!(
            map.players_that_can_see(Position::new(12, 12, 7), &creatures),
            vec![CreatureId(1)]
        );
    }

    #[test]
    fn items_can_only_land_on_existing_tiles() {
        let mut map = Map::open_floor("test", 2, 2, 7, 150);
        let item = Item {
            id: ItemId::next(),
            type_id: ItemTypeId(1),
            name: "stone".to_string(),
            count: 1,
            attributes: Vec::new(),
        };
        assert!(map.add_item(Position::new(1, 1, 7), item.clone()));
        assert!(!map.add_item(Position::new(5, 5, 7), item));
        assert_eq!(map.tile_at(Position::new(1, 1, 7)).map(|t| t.items.len()), Some(1));
    }
}
