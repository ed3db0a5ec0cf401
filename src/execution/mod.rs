//! Run execution: step retries, job fan-out, and concurrency groups

pub mod coordinator;
pub mod engine;
pub mod executor;

pub use coordinator::{RunCoordinator, RunHandle};
pub use engine::{EventBus, EventHandler, RunEngine, RunEvent};
pub use executor::StepExecutor;
