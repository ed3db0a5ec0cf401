//! Shell subprocess runner - executes step scripts via `sh -c`

use crate::shell::{CommandOutput, CommandRunner, CommandSpec, ShellError};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Runs step commands through a POSIX shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Shell executable (e.g. "sh", "/bin/bash")
    shell: String,
}

impl ShellRunner {
    /// Create a runner for a specific shell
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    #[cfg(test)]
    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    /// Run `sh -c <script>` to completion and capture its output.
    ///
    /// The child is killed if this future is dropped (job timeout or run
    /// cancellation), so no process outlives its job.
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ShellError> {
        debug!(
            "spawning {} -c (script: {} bytes, env: {} vars)",
            self.shell,
            spec.script.len(),
            spec.env.len()
        );

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&spec.script)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|source| ShellError::Spawn {
            shell: self.shell.clone(),
            source,
        })?;

        let exit_code = output.status.code().unwrap_or(-1);
        debug!("command exited with code {}", exit_code);

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
