//! Run engine - fans job instances out and drives them to completion

use crate::core::{JobInstance, JobState, StepState, WorkflowRun};
use crate::execution::StepExecutor;
use crate::shell::CommandRunner;
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events emitted while a run executes
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        total_jobs: usize,
    },
    JobStarted {
        job: String,
    },
    StepStarted {
        job: String,
        step: String,
        attempt: usize,
    },
    StepRetrying {
        job: String,
        step: String,
        attempt: usize,
        max_attempts: usize,
    },
    StepCompleted {
        job: String,
        step: String,
        attempts: usize,
    },
    StepSoftFailed {
        job: String,
        step: String,
        error: String,
    },
    StepFailed {
        job: String,
        step: String,
        error: String,
    },
    JobCompleted {
        job: String,
    },
    JobFailed {
        job: String,
        error: String,
    },
    JobTimedOut {
        job: String,
        limit_secs: u64,
    },
    JobCancelled {
        job: String,
    },
    RunCompleted {
        run_id: Uuid,
    },
    RunFailed {
        run_id: Uuid,
        failed_jobs: usize,
    },
    RunCancelled {
        run_id: Uuid,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Fan-out point for run events.
///
/// Handlers run synchronously on the emitting task, so they must be cheap
/// (the CLI handler just prints a line).
pub struct EventBus {
    handlers: Mutex<Vec<EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn add_handler<F>(&self, handler: F)
    where
        F: Fn(RunEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        handlers.push(Arc::new(handler));
    }

    pub fn emit(&self, event: RunEvent) {
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes a planned workflow run
pub struct RunEngine<R> {
    runner: Arc<R>,
    events: Arc<EventBus>,
}

impl<R: CommandRunner + 'static> RunEngine<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
            events: Arc::new(EventBus::new()),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(RunEvent) + Send + Sync + 'static,
    {
        self.events.add_handler(handler);
    }

    /// Execute a run that is not subject to cancellation
    pub async fn execute(&self, run: &mut WorkflowRun) -> Result<()> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.execute_with_cancellation(run, cancel_rx).await
    }

    /// Execute every job instance of the run in parallel.
    ///
    /// Instances share no mutable state and have no ordering dependency;
    /// the only throttle is a per-job semaphore when the job declares
    /// `max_parallel`. Each instance runs under its own wall-clock timeout
    /// and winds down as `Cancelled` when `cancel` fires.
    pub async fn execute_with_cancellation(
        &self,
        run: &mut WorkflowRun,
        cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        let run_id = run.run_id();
        let total_jobs = run.jobs.len();

        info!("starting run {} of '{}' ({} jobs)", run_id, run.workflow_name, total_jobs);
        run.state.start(total_jobs);
        self.events.emit(RunEvent::RunStarted {
            run_id,
            workflow_name: run.workflow_name.clone(),
            total_jobs,
        });

        // One semaphore per job id, shared by that job's matrix instances
        let mut limits: HashMap<String, Arc<Semaphore>> = HashMap::new();
        for job in &run.jobs {
            if let Some(max_parallel) = job.max_parallel {
                limits
                    .entry(job.job_id.clone())
                    .or_insert_with(|| Arc::new(Semaphore::new(max_parallel)));
            }
        }

        let jobs = std::mem::take(&mut run.jobs);
        let mut tasks: JoinSet<(usize, JobInstance)> = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let executor = StepExecutor::new(self.runner.clone(), self.events.clone());
            let limit = limits.get(&job.job_id).cloned();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = match limit {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let job = run_job_instance(executor, job, cancel).await;
                (index, job)
            });
        }

        let mut finished: Vec<(usize, JobInstance)> = Vec::with_capacity(total_jobs);
        while let Some(result) = tasks.join_next().await {
            let (index, job) = result.context("job task panicked")?;
            finished.push((index, job));
        }
        finished.sort_by_key(|(index, _)| *index);
        run.jobs = finished.into_iter().map(|(_, job)| job).collect();

        let completed = run
            .jobs
            .iter()
            .filter(|j| matches!(j.state, JobState::Completed { .. }))
            .count();
        let failed = run.jobs.iter().filter(|j| j.state.is_failure()).count();
        run.state.update_counts(total_jobs, completed, failed, 0);

        if *cancel.borrow() {
            warn!("run {} cancelled", run_id);
            run.state.cancel();
            self.events.emit(RunEvent::RunCancelled { run_id });
        } else if failed > 0 {
            error!("run {} failed ({}/{} jobs failed)", run_id, failed, total_jobs);
            run.state.fail();
            self.events.emit(RunEvent::RunFailed {
                run_id,
                failed_jobs: failed,
            });
        } else {
            info!("run {} completed", run_id);
            run.state.complete();
            self.events.emit(RunEvent::RunCompleted { run_id });
        }

        Ok(())
    }
}

enum JobOutcome {
    Completed,
    Failed(String),
    TimedOut,
    Cancelled,
}

async fn run_job_instance<R: CommandRunner>(
    executor: StepExecutor<R>,
    mut job: JobInstance,
    mut cancel: watch::Receiver<bool>,
) -> JobInstance {
    let started_at = Utc::now();
    job.state = JobState::Running { started_at };
    executor.events().emit(RunEvent::JobStarted {
        job: job.name.clone(),
    });

    let outcome = {
        let steps = tokio::time::timeout(job.timeout, run_steps(&executor, &mut job));
        tokio::pin!(steps);
        tokio::select! {
            _ = wait_for_cancel(&mut cancel) => JobOutcome::Cancelled,
            result = &mut steps => match result {
                Ok(Ok(())) => JobOutcome::Completed,
                Ok(Err(error)) => JobOutcome::Failed(error),
                Err(_) => JobOutcome::TimedOut,
            },
        }
    };

    match outcome {
        JobOutcome::Completed => {
            info!("job '{}' completed", job.name);
            job.state = JobState::Completed {
                started_at,
                completed_at: Utc::now(),
            };
            executor.events().emit(RunEvent::JobCompleted {
                job: job.name.clone(),
            });
        }
        JobOutcome::Failed(error) => {
            error!("job '{}' failed: {}", job.name, error);
            job.state = JobState::Failed {
                error: error.clone(),
                started_at,
                failed_at: Utc::now(),
            };
            executor.events().emit(RunEvent::JobFailed {
                job: job.name.clone(),
                error,
            });
        }
        JobOutcome::TimedOut => {
            let limit_secs = job.timeout.as_secs();
            error!("job '{}' exceeded its {}s limit", job.name, limit_secs);
            skip_unfinished(&mut job, "job timed out");
            job.state = JobState::TimedOut {
                limit_secs,
                started_at,
                timed_out_at: Utc::now(),
            };
            executor.events().emit(RunEvent::JobTimedOut {
                job: job.name.clone(),
                limit_secs,
            });
        }
        JobOutcome::Cancelled => {
            warn!("job '{}' cancelled", job.name);
            skip_unfinished(&mut job, "run cancelled");
            job.state = JobState::Cancelled {
                started_at: Some(started_at),
                cancelled_at: Utc::now(),
            };
            executor.events().emit(RunEvent::JobCancelled {
                job: job.name.clone(),
            });
        }
    }

    job
}

/// Run the job's steps strictly in order.
///
/// A fatal step failure skips every remaining step; a soft failure does
/// not. Returns the fatal error, if any.
async fn run_steps<R: CommandRunner>(
    executor: &StepExecutor<R>,
    job: &mut JobInstance,
) -> Result<(), String> {
    let job_name = job.name.clone();
    let mut fatal: Option<String> = None;

    for index in 0..job.steps.len() {
        if fatal.is_some() {
            job.steps[index].state = StepState::Skipped {
                reason: "previous step failed".to_string(),
            };
            continue;
        }

        let env = job.step_env(&job.steps[index]);
        let state = executor.execute(&job_name, &mut job.steps[index], env).await;
        if let StepState::Failed { error, .. } = &state {
            fatal = Some(error.clone());
        }
        job.steps[index].state = state;
    }

    match fatal {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Mark every step that never reached a terminal state as skipped
fn skip_unfinished(job: &mut JobInstance, reason: &str) {
    for step in &mut job.steps {
        if !step.state.is_terminal() {
            step.state = StepState::Skipped {
                reason: reason.to_string(),
            };
        }
    }
}

/// Resolves when the cancel signal fires; pends forever if the sender is
/// gone (an unsupervised run can never be cancelled).
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::WorkflowConfig;
    use crate::core::{EventKind, RunStatus, TriggerEvent};
    use crate::shell::{CommandOutput, CommandSpec, ShellError};
    use async_trait::async_trait;

    /// Succeeds everything except scripts containing "fail"
    struct ScriptedRunner;

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ShellError> {
            if spec.script.contains("fail") {
                Ok(CommandOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "scripted failure".to_string(),
                })
            } else {
                Ok(CommandOutput {
                    exit_code: 0,
                    stdout: "ok".to_string(),
                    stderr: String::new(),
                })
            }
        }
    }

    fn plan(yaml: &str) -> WorkflowRun {
        WorkflowConfig::from_yaml(yaml)
            .unwrap()
            .to_workflow()
            .unwrap()
            .plan(&TriggerEvent::new(EventKind::Push, "refs/heads/master"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_jobs_complete() {
        let mut run = plan(
            r#"
name: t
on:
  push: {}
jobs:
  build:
    strategy:
      matrix:
        python: ["3.9", "3.12"]
    steps:
      - run: echo build
"#,
        );

        let engine = RunEngine::new(ScriptedRunner);
        engine.execute(&mut run).await.unwrap();

        assert_eq!(run.state.status, RunStatus::Completed);
        assert_eq!(run.state.completed_jobs, 2);
        assert!(run.is_complete());
        assert!(!run.has_failures());
    }

    #[tokio::test]
    async fn test_fatal_step_skips_rest_and_fails_run() {
        let mut run = plan(
            r#"
name: t
on:
  push: {}
jobs:
  build:
    steps:
      - run: echo setup
      - run: fail now
      - run: echo never
"#,
        );

        let engine = RunEngine::new(ScriptedRunner);
        engine.execute(&mut run).await.unwrap();

        assert_eq!(run.state.status, RunStatus::Failed);
        let job = &run.jobs[0];
        assert!(job.state.is_failure());
        assert!(matches!(job.steps[0].state, StepState::Completed { .. }));
        assert!(matches!(job.steps[1].state, StepState::Failed { .. }));
        assert!(matches!(job.steps[2].state, StepState::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_soft_failure_does_not_fail_run() {
        let mut run = plan(
            r#"
name: t
on:
  push: {}
jobs:
  build:
    steps:
      - run: fail upload
        continue_on_error: true
      - run: echo after
"#,
        );

        let engine = RunEngine::new(ScriptedRunner);
        engine.execute(&mut run).await.unwrap();

        assert_eq!(run.state.status, RunStatus::Completed);
        let job = &run.jobs[0];
        assert!(matches!(job.steps[0].state, StepState::SoftFailed { .. }));
        assert!(matches!(job.steps[1].state, StepState::Completed { .. }));
    }

    #[tokio::test]
    async fn test_jobs_preserve_plan_order() {
        let mut run = plan(
            r#"
name: t
on:
  push: {}
jobs:
  build:
    strategy:
      matrix:
        python: ["3.9", "3.12"]
    steps:
      - run: echo build
"#,
        );
        let names: Vec<String> = run.jobs.iter().map(|j| j.name.clone()).collect();

        let engine = RunEngine::new(ScriptedRunner);
        engine.execute(&mut run).await.unwrap();

        let after: Vec<String> = run.jobs.iter().map(|j| j.name.clone()).collect();
        assert_eq!(names, after);
    }
}
