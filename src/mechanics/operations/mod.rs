//! Concrete units of game logic the scheduler runs.

pub mod apply_condition;
pub mod auto_walk;
pub mod cancel;
pub mod create_item;
pub mod death;
pub mod movement;
pub mod place_creature;
pub mod spawn;
pub mod speech;

pub use apply_condition::ApplyConditionOperation;
pub use auto_walk::AutoWalkOrchestratorOperation;
pub use cancel::CancelOperationsOperation;
pub use create_item::CreateItemOperation;
pub use death::DeathOperation;
pub use movement::{MovementOperation, TurnOperation};
pub use place_creature::PlaceCreatureOperation;
pub use spawn::{Spawn, SpawnMonstersOperation};
pub use speech::SpeechOperation;
