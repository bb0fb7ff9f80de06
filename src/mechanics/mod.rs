pub mod conditions;
pub mod context;
pub mod handlers;
pub mod operations;

pub use context::{MechanicsSettings, OperationContext, Services};
pub use handlers::{handle_request, PlayerRequest};
