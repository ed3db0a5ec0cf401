//! Command specification and captured output

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A fully rendered command ready to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Shell script passed to `sh -c`
    pub script: String,

    /// Environment overlaid on the parent environment
    pub env: Vec<(String, String)>,

    /// Working directory for the command
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Create a spec with no extra environment
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            env: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Process exit code (-1 when terminated by a signal)
    pub exit_code: i32,

    /// Captured standard output (lossily decoded)
    pub stdout: String,

    /// Captured standard error (lossily decoded)
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Short failure description: exit code plus a stderr tail
    pub fn describe_failure(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            return format!("exited with code {}", self.exit_code);
        }
        let mut tail: Vec<&str> = stderr.lines().rev().take(3).collect();
        tail.reverse();
        format!("exited with code {}: {}", self.exit_code, tail.join("\n"))
    }
}
