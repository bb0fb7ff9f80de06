pub mod event;
pub mod exhaustion;
pub mod runner;
pub mod scheduler;

pub use event::{Condition, EventId, EventType, Operation, ScheduledEvent};
pub use runner::{EventFailure, EventRunner, FailureReason, RunReport, RunSummary, SimulationControl};
pub use scheduler::{ConditionApplied, Scheduler};
