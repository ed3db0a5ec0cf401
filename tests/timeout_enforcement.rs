//! Job wall-clock timeouts

mod helpers;

use conveyor::core::{JobState, RunStatus, StepState};
use conveyor::execution::RunEngine;
use helpers::{push, workflow, MockBehavior, MockRunner};
use std::time::Duration;

#[tokio::test]
async fn job_exceeding_its_limit_is_a_failure() {
    let workflow = workflow(
        r#"
name: slow
on:
  push: {}
jobs:
  build:
    steps:
      - name: Run tests
        run: pytest
"#,
    );
    let mut run = workflow.plan(&push("master")).unwrap();
    // config granularity is minutes; tighten the planned instance directly
    run.jobs[0].timeout = Duration::from_millis(100);

    let engine = RunEngine::new(MockRunner::new().on("pytest", MockBehavior::Hang));
    engine.execute(&mut run).await.unwrap();

    assert_eq!(run.state.status, RunStatus::Failed);
    let job = &run.jobs[0];
    assert!(matches!(job.state, JobState::TimedOut { .. }));
    assert!(job.state.is_failure());
    assert!(matches!(job.steps[0].state, StepState::Skipped { .. }));
}

#[tokio::test]
async fn sibling_within_its_limit_still_completes() {
    let workflow = workflow(
        r#"
name: mixed
on:
  push: {}
jobs:
  build:
    strategy:
      matrix:
        python: ["3.9", "3.12"]
    steps:
      - run: "pytest --python {{ matrix.python }}"
"#,
    );
    let mut run = workflow.plan(&push("master")).unwrap();
    for job in &mut run.jobs {
        job.timeout = Duration::from_millis(200);
    }

    // only the 3.9 instance hangs
    let engine = RunEngine::new(MockRunner::new().on("--python 3.9", MockBehavior::Hang));
    engine.execute(&mut run).await.unwrap();

    assert_eq!(run.state.status, RunStatus::Failed);
    assert_eq!(run.state.failed_jobs, 1);
    assert_eq!(run.state.completed_jobs, 1);
    assert!(matches!(run.jobs[0].state, JobState::TimedOut { .. }));
    assert!(matches!(run.jobs[1].state, JobState::Completed { .. }));
}

#[tokio::test]
async fn finished_steps_keep_their_state_after_a_timeout() {
    let workflow = workflow(
        r#"
name: partial
on:
  push: {}
jobs:
  build:
    steps:
      - name: Install
        run: ./install-deps.sh
      - name: Run tests
        run: pytest
      - name: Upload coverage
        run: codecov upload
"#,
    );
    let mut run = workflow.plan(&push("master")).unwrap();
    run.jobs[0].timeout = Duration::from_millis(200);

    let runner = MockRunner::new().on("pytest", MockBehavior::Hang);
    let engine = RunEngine::new(runner.clone());
    engine.execute(&mut run).await.unwrap();

    let job = &run.jobs[0];
    assert!(matches!(job.steps[0].state, StepState::Completed { .. }));
    assert!(matches!(job.steps[1].state, StepState::Skipped { .. }));
    assert!(matches!(job.steps[2].state, StepState::Skipped { .. }));
    // the step after the hang was never started
    assert_eq!(runner.call_count("codecov"), 0);
}
