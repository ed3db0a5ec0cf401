//! Shared test utilities: a scripted command runner and run assertions
#![allow(dead_code)]

use async_trait::async_trait;
use conveyor::core::config::WorkflowConfig;
use conveyor::core::{EventKind, JobInstance, StepState, TriggerEvent, Workflow, WorkflowRun};
use conveyor::execution::RunEngine;
use conveyor::shell::{CommandOutput, CommandRunner, CommandSpec, ShellError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a mock rule does when its needle matches
#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    /// Exit 0
    Succeed,
    /// Exit 1 every time
    Fail,
    /// Exit 1 for the first n calls, then exit 0
    FailTimes(usize),
    /// Sleep, then exit 0
    Delay(Duration),
    /// Never return (the caller is expected to cancel or time out)
    Hang,
    /// Hang for the first n calls, then exit 0
    HangTimes(usize),
}

struct MockRule {
    needle: String,
    behavior: MockBehavior,
    seen: usize,
}

enum Outcome {
    Pass,
    Fail,
    Delay(Duration),
    Hang,
}

/// Command runner scripted by substring rules.
///
/// The first rule whose needle appears in the step script decides the
/// outcome; unmatched scripts succeed. Clones share rules and call log, so
/// one runner can serve several runs through a coordinator.
#[derive(Clone, Default)]
pub struct MockRunner {
    rules: Arc<Mutex<Vec<MockRule>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: &str, behavior: MockBehavior) -> Self {
        self.rules.lock().unwrap().push(MockRule {
            needle: needle.to_string(),
            behavior,
            seen: 0,
        });
        self
    }

    /// Every script executed, in invocation order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of executed scripts containing the needle
    pub fn call_count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|script| script.contains(needle))
            .count()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ShellError> {
        self.calls.lock().unwrap().push(spec.script.clone());

        let outcome = {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| spec.script.contains(&r.needle)) {
                None => Outcome::Pass,
                Some(rule) => {
                    rule.seen += 1;
                    match rule.behavior {
                        MockBehavior::Succeed => Outcome::Pass,
                        MockBehavior::Fail => Outcome::Fail,
                        MockBehavior::FailTimes(n) => {
                            if rule.seen <= n {
                                Outcome::Fail
                            } else {
                                Outcome::Pass
                            }
                        }
                        MockBehavior::Delay(duration) => Outcome::Delay(duration),
                        MockBehavior::Hang => Outcome::Hang,
                        MockBehavior::HangTimes(n) => {
                            if rule.seen <= n {
                                Outcome::Hang
                            } else {
                                Outcome::Pass
                            }
                        }
                    }
                }
            }
        };

        match outcome {
            Outcome::Pass => Ok(success_output()),
            Outcome::Fail => Ok(CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "mock failure".to_string(),
            }),
            Outcome::Delay(duration) => {
                tokio::time::sleep(duration).await;
                Ok(success_output())
            }
            Outcome::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

fn success_output() -> CommandOutput {
    CommandOutput {
        exit_code: 0,
        stdout: "ok".to_string(),
        stderr: String::new(),
    }
}

/// Parse, validate, and convert a workflow from inline YAML
pub fn workflow(yaml: &str) -> Workflow {
    WorkflowConfig::from_yaml(yaml)
        .expect("workflow YAML should parse")
        .to_workflow()
        .expect("workflow config should convert")
}

pub fn push(ref_name: &str) -> TriggerEvent {
    TriggerEvent::new(EventKind::Push, ref_name)
}

pub fn pull_request(ref_name: &str) -> TriggerEvent {
    TriggerEvent::new(EventKind::PullRequest, ref_name)
}

/// Plan and execute a run against a mock runner
pub async fn run_workflow(yaml: &str, event: TriggerEvent, runner: MockRunner) -> WorkflowRun {
    let workflow = workflow(yaml);
    let mut run = workflow
        .plan(&event)
        .expect("event should trigger the workflow");
    RunEngine::new(runner)
        .execute(&mut run)
        .await
        .expect("engine should not error");
    run
}

/// Find a job instance by its rendered name
pub fn job<'a>(run: &'a WorkflowRun, name: &str) -> &'a JobInstance {
    run.jobs
        .iter()
        .find(|j| j.name == name)
        .unwrap_or_else(|| {
            let names: Vec<&str> = run.jobs.iter().map(|j| j.name.as_str()).collect();
            panic!("no job named '{}' (have: {:?})", name, names)
        })
}

pub fn assert_step_completed(job: &JobInstance, index: usize, expected_attempts: usize) {
    match &job.steps[index].state {
        StepState::Completed { attempts, .. } => assert_eq!(
            *attempts, expected_attempts,
            "step '{}' attempts",
            job.steps[index].name
        ),
        other => panic!(
            "expected step '{}' to be Completed, got {:?}",
            job.steps[index].name, other
        ),
    }
}

pub fn assert_step_failed(job: &JobInstance, index: usize, expected_attempts: usize) {
    match &job.steps[index].state {
        StepState::Failed { attempts, .. } => assert_eq!(
            *attempts, expected_attempts,
            "step '{}' attempts",
            job.steps[index].name
        ),
        other => panic!(
            "expected step '{}' to be Failed, got {:?}",
            job.steps[index].name, other
        ),
    }
}

pub fn assert_step_soft_failed(job: &JobInstance, index: usize) {
    assert!(
        matches!(job.steps[index].state, StepState::SoftFailed { .. }),
        "expected step '{}' to be SoftFailed, got {:?}",
        job.steps[index].name,
        job.steps[index].state
    );
}

pub fn assert_step_skipped(job: &JobInstance, index: usize) {
    assert!(
        matches!(job.steps[index].state, StepState::Skipped { .. }),
        "expected step '{}' to be Skipped, got {:?}",
        job.steps[index].name,
        job.steps[index].state
    );
}
