use crate::error::EventError;
use crate::mechanics::context::OperationContext;
use crate::notifications::kinds::TileUpdatedNotification;
use crate::scheduling::event::{EventType, Operation};
use crate::world::items::ItemCreationArguments;
use crate::world::position::Position;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CreateItemOperation {
    arguments: ItemCreationArguments,
    location: Position,
}

impl CreateItemOperation {
    pub fn new(arguments: ItemCreationArguments, location: Position) -> Self {
        Self { arguments, location }
    }
}

impl Operation for CreateItemOperation {
    fn event_type(&self) -> EventType {
        EventType::CREATE_ITEM
    }

    fn execute(&mut self, ctx: &mut OperationContext<'_>) -> Result<(), EventError> {
        if !ctx.map.has_tile_at(self.location) {
            return Err(EventError::TileNotFound(self.location));
        }
        let Some(item) = ctx.items.create(&self.arguments) else {
            debug!(type_id = ?self.arguments.type_id, "item factory declined to create item");
            return Ok(());
        };
        if ctx.map.add_item(self.location, item) {
            ctx.notify(TileUpdatedNotification {
                location: self.location,
            });
        }
        Ok(())
    }
}
