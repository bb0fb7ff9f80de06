use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
    Northeast,
    Northwest,
    Southeast,
    Southwest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionDelta {
    pub dx: i32,
    pub dy: i32,
    pub dz: i32,
}

pub const ALL_DIRECTIONS: [Direction; 8] = [
    Direction::North,
    Direction::East,
    Direction::South,
    Direction::West,
    Direction::Northeast,
    Direction::Northwest,
    Direction::Southeast,
    Direction::Southwest,
];

impl Position {
    pub const fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, delta: PositionDelta) -> Option<Self> {
        let x = i32::from(self.x) + delta.dx;
        let y = i32::from(self.y) + delta.dy;
        let z = i32::from(self.z) + delta.dz;

        if x < 0 || y < 0 || z < 0 {
            return None;
        }

        if x > i32::from(u16::MAX) || y > i32::from(u16::MAX) || z > i32::from(u8::MAX) {
            return None;
        }

        Some(Self {
            x: x as u16,
            y: y as u16,
            z: z as u8,
        })
    }

    pub fn step(self, direction: Direction) -> Option<Self> {
        self.offset(direction.delta())
    }

    /// Signed difference `self - other`.
    pub fn delta_from(self, other: Position) -> PositionDelta {
        PositionDelta {
            dx: i32::from(self.x) - i32::from(other.x),
            dy: i32::from(self.y) - i32::from(other.y),
            dz: i32::from(self.z) - i32::from(other.z),
        }
    }

    /// Chebyshev distance on the x/y plane, ignoring floors.
    pub fn max_distance_2d(self, other: Position) -> u32 {
        let delta = self.delta_from(other);
        delta.dx.unsigned_abs().max(delta.dy.unsigned_abs())
    }

    pub fn direction_to(self, other: Position) -> Option<Direction> {
        let delta = other.delta_from(self);
        Direction::from_delta(delta.dx.signum(), delta.dy.signum())
    }

    pub fn is_adjacent_to(self, other: Position) -> bool {
        self.z == other.z && self != other && self.max_distance_2d(other) == 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

impl Direction {
    pub fn delta(self) -> PositionDelta {
        let (dx, dy) = match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
            Direction::Northeast => (1, -1),
            Direction::Northwest => (-1, -1),
            Direction::Southeast => (1, 1),
            Direction::Southwest => (-1, 1),
        };
        PositionDelta { dx, dy, dz: 0 }
    }

    pub fn from_delta(dx: i32, dy: i32) -> Option<Direction> {
        match (dx, dy) {
            (0, -1) => Some(Direction::North),
            (1, 0) => Some(Direction::East),
            (0, 1) => Some(Direction::South),
            (-1, 0) => Some(Direction::West),
            (1, -1) => Some(Direction::Northeast),
            (-1, -1) => Some(Direction::Northwest),
            (1, 1) => Some(Direction::Southeast),
            (-1, 1) => Some(Direction::Southwest),
            _ => None,
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            Direction::Northeast
                | Direction::Northwest
                | Direction::Southeast
                | Direction::Southwest
        )
    }

    /// Clients only render the four cardinal facings.
    pub fn client_safe(self) -> Direction {
        match self {
            Direction::Northeast | Direction::Southeast => Direction::East,
            Direction::Northwest | Direction::Southwest => Direction::West,
            other => other,
        }
    }
}
