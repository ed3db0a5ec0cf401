//! Workflow configuration from YAML

use crate::core::trigger::BranchPattern;
use crate::core::Workflow;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Job wall-clock limit applied when `timeout_minutes` is omitted
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 60;

fn default_max_attempts() -> usize {
    1
}

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    pub name: String,

    /// Events that trigger this workflow
    pub on: TriggerConfig,

    /// Concurrency group for overlapping runs
    #[serde(default)]
    pub concurrency: Option<ConcurrencyConfig>,

    /// Environment variables shared by every job
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Jobs keyed by id (BTreeMap keeps plan order deterministic)
    pub jobs: BTreeMap<String, JobConfig>,
}

/// Trigger configuration: which events run the workflow.
///
/// A missing event key means that event never triggers; an event with an
/// empty `branches` list (or `push: {}`) triggers on every branch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub push: Option<BranchFilter>,

    #[serde(default)]
    pub pull_request: Option<BranchFilter>,
}

/// Branch filter for one event kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchFilter {
    /// Branch glob patterns; empty matches every branch
    #[serde(default)]
    pub branches: Vec<String>,
}

/// Concurrency group configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Group key template, e.g. `ci-{{ branch }}`
    pub group: String,

    /// Cancel an in-flight run of the same group instead of queueing behind it
    #[serde(default)]
    pub cancel_in_progress: bool,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Display name template (defaults to the job id plus matrix label)
    #[serde(default)]
    pub name: Option<String>,

    /// Matrix strategy
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,

    /// Environment variables for this job's steps
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Wall-clock limit in minutes (default 60)
    #[serde(default)]
    pub timeout_minutes: Option<u64>,

    /// Steps, executed sequentially
    pub steps: Vec<StepConfig>,
}

/// Matrix strategy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Axis name -> scalar values (quote versions like "3.10" so YAML
    /// does not read them as the number 3.1)
    #[serde(default)]
    pub matrix: BTreeMap<String, Vec<Value>>,

    /// Cap on concurrently running instances of this job
    #[serde(default)]
    pub max_parallel: Option<usize>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Human-readable step name
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command to run
    pub run: String,

    /// Environment variables for this step only
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Total attempts before the step is considered failed (default 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Demote a failure to a warning instead of failing the job
    #[serde(default)]
    pub continue_on_error: bool,

    /// Working directory for the command
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Convert a YAML scalar to its string form.
///
/// Workflow files carry versions and flags as bare scalars; anything
/// structured is a configuration mistake.
pub(crate) fn scalar_to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => bail!("expected a scalar value, got: {:?}", other),
    }
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.as_ref().display()))?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("workflow name cannot be empty");
        }

        if self.on.push.is_none() && self.on.pull_request.is_none() {
            bail!("workflow must declare at least one trigger event (push or pull_request)");
        }

        for (event, filter) in [("push", &self.on.push), ("pull_request", &self.on.pull_request)] {
            if let Some(filter) = filter {
                for pattern in &filter.branches {
                    BranchPattern::compile(pattern)
                        .with_context(|| format!("invalid {} branch filter", event))?;
                }
            }
        }

        if let Some(concurrency) = &self.concurrency {
            if concurrency.group.trim().is_empty() {
                bail!("concurrency group cannot be empty");
            }
        }

        for (key, value) in &self.env {
            scalar_to_string(value)
                .with_context(|| format!("workflow env '{}' is not a scalar", key))?;
        }

        if self.jobs.is_empty() {
            bail!("workflow must define at least one job");
        }

        for (job_id, job) in &self.jobs {
            self.validate_job(job_id, job)?;
        }

        Ok(())
    }

    fn validate_job(&self, job_id: &str, job: &JobConfig) -> Result<()> {
        if job.timeout_minutes == Some(0) {
            bail!("job '{}': timeout_minutes must be at least 1", job_id);
        }

        if let Some(strategy) = &job.strategy {
            if strategy.max_parallel == Some(0) {
                bail!("job '{}': max_parallel must be at least 1", job_id);
            }
            for (axis, values) in &strategy.matrix {
                if axis.trim().is_empty() {
                    bail!("job '{}': matrix axis name cannot be empty", job_id);
                }
                if values.is_empty() {
                    bail!("job '{}': matrix axis '{}' has no values", job_id, axis);
                }
                for value in values {
                    scalar_to_string(value).with_context(|| {
                        format!("job '{}': matrix axis '{}' has a non-scalar value", job_id, axis)
                    })?;
                }
            }
        }

        for (key, value) in &job.env {
            scalar_to_string(value)
                .with_context(|| format!("job '{}' env '{}' is not a scalar", job_id, key))?;
        }

        if job.steps.is_empty() {
            bail!("job '{}' has no steps", job_id);
        }

        for (index, step) in job.steps.iter().enumerate() {
            let label = step
                .name
                .clone()
                .unwrap_or_else(|| format!("step {}", index + 1));
            if step.run.trim().is_empty() {
                bail!("job '{}' {}: run command cannot be empty", job_id, label);
            }
            if step.max_attempts == 0 {
                bail!("job '{}' {}: max_attempts must be at least 1", job_id, label);
            }
            for (key, value) in &step.env {
                scalar_to_string(value).with_context(|| {
                    format!("job '{}' {} env '{}' is not a scalar", job_id, label, key)
                })?;
            }
        }

        Ok(())
    }

    /// Convert the config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}
