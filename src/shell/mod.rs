//! Shell command execution for workflow steps

pub mod output;
pub mod subprocess;

use async_trait::async_trait;
pub use output::{CommandOutput, CommandSpec};
pub use subprocess::ShellRunner;
use thiserror::Error;

/// Error types for command execution
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },
}

/// Trait for running step commands - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ShellError>;
}
