use crate::world::position::Position;

/// Tiles a client shows around its own creature: 18 wide, 14 high, with
/// the viewer one tile right of and below the centre.
pub const VIEW_LEFT: u16 = 9;
pub const VIEW_RIGHT: u16 = 8;
pub const VIEW_UP: u16 = 7;
pub const VIEW_DOWN: u16 = 6;

/// Rectangle of one floor a viewer has on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub min: Position,
    pub max: Position,
}

impl Viewport {
    pub fn around(viewer: Position) -> Self {
        Self {
            min: Position::new(
                viewer.x.saturating_sub(VIEW_LEFT),
                viewer.y.saturating_sub(VIEW_UP),
                viewer.z,
            ),
            max: Position::new(
                viewer.x.saturating_add(VIEW_RIGHT),
                viewer.y.saturating_add(VIEW_DOWN),
                viewer.z,
            ),
        }
    }

    pub fn contains(&self, position: Position) -> bool {
        position.z == self.min.z
            && (self.min.x..=self.max.x).contains(&position.x)
            && (self.min.y..=self.max.y).contains(&position.y)
    }

    /// Whether a viewer standing at `viewer` has `position` on screen.
    pub fn can_see(viewer: Position, position: Position) -> bool {
        Self::around(viewer).contains(position)
    }
}
