//! Workflow domain model and run planning

use crate::core::config::{scalar_to_string, BranchFilter, WorkflowConfig};
use crate::core::context::RunContext;
use crate::core::job::{JobInstance, JobTemplate};
use crate::core::state::{RunState, RunStatus};
use crate::core::trigger::{BranchPattern, TriggerEvent, TriggerSet};
use anyhow::Result;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A workflow definition
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    /// Compiled trigger filters
    pub triggers: TriggerSet,

    /// Concurrency group policy
    pub concurrency: Option<ConcurrencyPolicy>,

    /// Env value templates shared by every job
    pub env: BTreeMap<String, String>,

    /// Job templates, in definition order
    pub jobs: Vec<JobTemplate>,
}

/// How overlapping runs of the same group are handled
#[derive(Debug, Clone)]
pub struct ConcurrencyPolicy {
    /// Group key template, rendered per run
    pub group: String,

    /// true: cancel the in-flight run; false: queue behind it
    pub cancel_in_progress: bool,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let triggers = TriggerSet {
            push: compile_filter(&config.on.push)?,
            pull_request: compile_filter(&config.on.pull_request)?,
        };

        let env = config
            .env
            .iter()
            .map(|(key, value)| Ok((key.clone(), scalar_to_string(value)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let jobs = config
            .jobs
            .iter()
            .map(|(id, job)| JobTemplate::from_config(id, job))
            .collect::<Result<Vec<_>>>()?;

        let concurrency = config.concurrency.as_ref().map(|c| ConcurrencyPolicy {
            group: c.group.clone(),
            cancel_in_progress: c.cancel_in_progress,
        });

        Ok(Self {
            name: config.name.clone(),
            triggers,
            concurrency,
            env,
            jobs,
        })
    }

    /// Total number of job instances a run of this workflow produces
    pub fn instance_count(&self) -> usize {
        self.jobs.iter().map(|j| j.matrix.instance_count()).sum()
    }

    /// Plan a run for an incoming event.
    ///
    /// Returns `None` when the event does not trigger this workflow.
    /// Otherwise every job template is expanded across its matrix and all
    /// templated strings (group key, names, env, scripts) are rendered.
    pub fn plan(&self, event: &TriggerEvent) -> Option<WorkflowRun> {
        if !self.triggers.matches(event) {
            return None;
        }

        let ctx = RunContext::for_event(&self.name, event);

        let jobs: Vec<JobInstance> = self
            .jobs
            .iter()
            .flat_map(|template| template.expand(&ctx, &self.env))
            .collect();

        let (group, cancel_in_progress) = match &self.concurrency {
            Some(policy) => (Some(ctx.render(&policy.group)), policy.cancel_in_progress),
            None => (None, false),
        };

        Some(WorkflowRun {
            workflow_name: self.name.clone(),
            event: event.clone(),
            group,
            cancel_in_progress,
            jobs,
            state: RunState::new(),
        })
    }
}

fn compile_filter(filter: &Option<BranchFilter>) -> Result<Option<Vec<BranchPattern>>> {
    match filter {
        None => Ok(None),
        Some(filter) => {
            let patterns = filter
                .branches
                .iter()
                .map(|pattern| BranchPattern::compile(pattern))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(patterns))
        }
    }
}

/// A planned or executing run of a workflow
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    /// Name of the workflow this run belongs to
    pub workflow_name: String,

    /// The event that triggered the run
    pub event: TriggerEvent,

    /// Rendered concurrency group key
    pub group: Option<String>,

    /// Cancellation policy inherited from the workflow
    pub cancel_in_progress: bool,

    /// Expanded job instances
    pub jobs: Vec<JobInstance>,

    /// Runtime state
    pub state: RunState,
}

impl WorkflowRun {
    pub fn run_id(&self) -> Uuid {
        self.state.run_id
    }

    /// Check if every job reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|j| j.state.is_terminal())
    }

    /// Check if any job failed or timed out
    pub fn has_failures(&self) -> bool {
        self.jobs.iter().any(|j| j.state.is_failure())
    }

    pub fn was_cancelled(&self) -> bool {
        self.state.status == RunStatus::Cancelled
    }

    /// Wall-clock duration once the run has finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.state.started_at, self.state.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }
}
