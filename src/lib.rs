//! conveyor - a local CI workflow runner

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod shell;

// Re-export commonly used types
pub use crate::core::{
    EventKind, JobInstance, JobState, RunState, RunStatus, Step, StepState, TriggerEvent, Workflow,
    WorkflowRun,
};
pub use crate::execution::{RunCoordinator, RunEngine, RunEvent, RunHandle};
pub use crate::shell::{CommandOutput, CommandRunner, CommandSpec, ShellRunner};
