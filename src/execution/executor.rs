//! Step executor - runs one step to a terminal state

use crate::core::{Step, StepState};
use crate::execution::engine::{EventBus, RunEvent};
use crate::shell::{CommandRunner, CommandSpec};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Executes a single step, retrying up to its attempt budget
pub struct StepExecutor<R> {
    runner: Arc<R>,
    events: Arc<EventBus>,
}

impl<R> Clone for StepExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            events: self.events.clone(),
        }
    }
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: Arc<R>, events: Arc<EventBus>) -> Self {
        Self { runner, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run a step to completion and return its terminal state.
    ///
    /// Attempts are strictly sequential with no backoff and no failure
    /// classification: the same command is re-run until it succeeds or the
    /// attempt budget is spent. A step marked `continue_on_error` ends
    /// `SoftFailed` instead of `Failed`, which demotes the failure to a
    /// warning and lets the job continue. The step is `Running` while an
    /// attempt is in flight, so a timed-out or cancelled job sees it as
    /// unfinished.
    pub async fn execute(
        &self,
        job_name: &str,
        step: &mut Step,
        env: Vec<(String, String)>,
    ) -> StepState {
        let spec = CommandSpec {
            script: step.script.clone(),
            env,
            working_dir: step.working_dir.clone(),
        };

        let mut last_error = String::new();
        let mut last_started_at = Utc::now();

        for attempt in 1..=step.max_attempts {
            last_started_at = Utc::now();
            step.state = StepState::Running {
                started_at: last_started_at,
                attempt,
            };
            self.events.emit(RunEvent::StepStarted {
                job: job_name.to_string(),
                step: step.name.clone(),
                attempt,
            });
            debug!(
                "[{}] running step '{}' (attempt {}/{})",
                job_name, step.name, attempt, step.max_attempts
            );

            match self.runner.execute(&spec).await {
                Ok(output) if output.success() => {
                    info!("[{}] step '{}' completed", job_name, step.name);
                    self.events.emit(RunEvent::StepCompleted {
                        job: job_name.to_string(),
                        step: step.name.clone(),
                        attempts: attempt,
                    });
                    return StepState::Completed {
                        output: output.stdout,
                        attempts: attempt,
                        started_at: last_started_at,
                        completed_at: Utc::now(),
                    };
                }
                Ok(output) => {
                    last_error = output.describe_failure();
                    warn!(
                        "[{}] step '{}' attempt {}/{} failed: {}",
                        job_name, step.name, attempt, step.max_attempts, last_error
                    );
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        "[{}] step '{}' attempt {}/{} failed: {}",
                        job_name, step.name, attempt, step.max_attempts, last_error
                    );
                }
            }

            if attempt < step.max_attempts {
                self.events.emit(RunEvent::StepRetrying {
                    job: job_name.to_string(),
                    step: step.name.clone(),
                    attempt: attempt + 1,
                    max_attempts: step.max_attempts,
                });
            }
        }

        let failed_at = Utc::now();
        if step.continue_on_error {
            warn!(
                "[{}] step '{}' failed but is continue_on_error, continuing",
                job_name, step.name
            );
            self.events.emit(RunEvent::StepSoftFailed {
                job: job_name.to_string(),
                step: step.name.clone(),
                error: last_error.clone(),
            });
            StepState::SoftFailed {
                error: last_error,
                attempts: step.max_attempts,
                last_started_at,
                failed_at,
            }
        } else {
            self.events.emit(RunEvent::StepFailed {
                job: job_name.to_string(),
                step: step.name.clone(),
                error: last_error.clone(),
            });
            StepState::Failed {
                error: last_error,
                attempts: step.max_attempts,
                last_started_at,
                failed_at,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{CommandOutput, ShellError};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then succeeds
    struct FlakyRunner {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyRunner {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FlakyRunner {
        async fn execute(&self, _spec: &CommandSpec) -> Result<CommandOutput, ShellError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Ok(CommandOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "flaky".to_string(),
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

    fn step(max_attempts: usize, continue_on_error: bool) -> Step {
        Step {
            name: "Run tests".to_string(),
            script: "pytest".to_string(),
            env: BTreeMap::new(),
            max_attempts,
            continue_on_error,
            working_dir: None,
            state: StepState::Pending,
        }
    }

    fn executor(runner: FlakyRunner) -> StepExecutor<FlakyRunner> {
        StepExecutor::new(Arc::new(runner), Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let executor = executor(FlakyRunner::new(0));
        let mut step = step(3, false);
        let state = executor.execute("linux", &mut step, vec![]).await;
        assert!(matches!(state, StepState::Completed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let executor = executor(FlakyRunner::new(2));
        let mut step = step(3, false);
        let state = executor.execute("linux", &mut step, vec![]).await;
        assert!(matches!(state, StepState::Completed { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_attempts_exhausted_is_failed() {
        let runner = FlakyRunner::new(5);
        let executor = executor(runner);
        let mut step = step(3, false);
        let state = executor.execute("linux", &mut step, vec![]).await;
        match state {
            StepState::Failed { attempts, error, .. } => {
                assert_eq!(attempts, 3);
                assert!(error.contains("exited with code 1"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        // exactly three attempts were made
        assert_eq!(executor.runner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_continue_on_error_soft_fails() {
        let executor = executor(FlakyRunner::new(5));
        let mut step = step(1, true);
        let state = executor.execute("linux", &mut step, vec![]).await;
        assert!(matches!(state, StepState::SoftFailed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_retry_events_emitted() {
        let events = Arc::new(EventBus::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        events.add_handler(move |event| {
            if let RunEvent::StepRetrying { attempt, .. } = event {
                sink.lock().unwrap().push(attempt);
            }
        });

        let executor = StepExecutor::new(Arc::new(FlakyRunner::new(5)), events);
        let mut step = step(3, false);
        executor.execute("linux", &mut step, vec![]).await;

        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }

    /// A command that never returns
    struct HangingRunner;

    #[async_trait]
    impl CommandRunner for HangingRunner {
        async fn execute(&self, _spec: &CommandSpec) -> Result<CommandOutput, ShellError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_in_flight_step_reports_running() {
        let executor = StepExecutor::new(Arc::new(HangingRunner), Arc::new(EventBus::new()));
        let mut step = step(3, false);

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            executor.execute("linux", &mut step, vec![]),
        )
        .await;

        // the attempt was abandoned mid-flight; the step is Running, not terminal
        assert!(result.is_err());
        assert!(matches!(step.state, StepState::Running { attempt: 1, .. }));
        assert!(!step.state.is_terminal());
    }
}
