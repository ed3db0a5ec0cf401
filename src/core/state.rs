//! Run, job, and step state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run has not started
    Pending,
    /// Run is currently executing
    Running,
    /// All jobs finished without a fatal failure
    Completed,
    /// At least one job failed or timed out
    Failed,
    /// Run was cancelled by a newer run in its concurrency group
    Cancelled,
}

/// State of a single job instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    /// Job has not started
    Pending,
    /// Job is currently running its steps
    Running {
        started_at: DateTime<Utc>,
    },
    /// All steps finished without a fatal failure
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// A fatal step failed
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Job exceeded its wall-clock limit
    TimedOut {
        limit_secs: u64,
        started_at: DateTime<Utc>,
        timed_out_at: DateTime<Utc>,
    },
    /// Job was cancelled before finishing
    Cancelled {
        started_at: Option<DateTime<Utc>>,
        cancelled_at: DateTime<Utc>,
    },
}

impl JobState {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running { .. })
    }

    /// Timed-out jobs count as failures
    pub fn is_failure(&self) -> bool {
        matches!(self, JobState::Failed { .. } | JobState::TimedOut { .. })
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not started
    Pending,
    /// Step is currently running
    Running {
        started_at: DateTime<Utc>,
        attempt: usize,
    },
    /// Step completed successfully
    Completed {
        output: String,
        attempts: usize,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed after all attempts but was marked continue_on_error
    SoftFailed {
        error: String,
        attempts: usize,
        last_started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step failed after all attempts
    Failed {
        error: String,
        attempts: usize,
        last_started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step never ran (earlier fatal failure, timeout, or cancellation)
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if the step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepState::Pending | StepState::Running { .. })
    }

    /// Number of attempts made so far
    pub fn attempts(&self) -> usize {
        match self {
            StepState::Pending | StepState::Skipped { .. } => 0,
            StepState::Running { attempt, .. } => *attempt,
            StepState::Completed { attempts, .. }
            | StepState::SoftFailed { attempts, .. }
            | StepState::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Overall state of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run ID
    pub run_id: Uuid,

    /// Current run status
    pub status: RunStatus,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the run completed, failed, or was cancelled
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of job instances
    pub total_jobs: usize,

    /// Number of completed job instances
    pub completed_jobs: usize,

    /// Number of failed or timed-out job instances
    pub failed_jobs: usize,

    /// Number of currently running job instances
    pub running_jobs: usize,
}

impl RunState {
    /// Create a new run state
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            running_jobs: 0,
        }
    }

    /// Mark the run as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
    }

    /// Mark the run as completed
    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the run as failed
    pub fn fail(&mut self) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the run as cancelled
    pub fn cancel(&mut self) {
        self.status = RunStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Update job counts from the current job states
    pub fn update_counts(&mut self, total: usize, completed: usize, failed: usize, running: usize) {
        self.total_jobs = total;
        self.completed_jobs = completed;
        self.failed_jobs = failed;
        self.running_jobs = running;
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        (self.completed_jobs + self.failed_jobs) as f64 / self.total_jobs as f64
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
