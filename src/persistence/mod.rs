//! Persistence layer for workflow run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::RunStatus;
use crate::core::WorkflowRun;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Workflow name
    pub workflow_name: String,

    /// Rendered concurrency group key, if any
    pub group: Option<String>,

    /// Event kind that triggered the run (`push` or `pull_request`)
    pub event: String,

    /// Git ref the event pointed at
    pub ref_name: String,

    /// Run status
    pub status: RunStatus,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if it did)
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of job instances
    pub total_jobs: usize,

    /// Number of completed job instances
    pub completed_jobs: usize,

    /// Number of failed or timed-out job instances
    pub failed_jobs: usize,

    /// Progress (0.0 to 1.0)
    pub progress: f64,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run summary
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List recent runs, newest first, optionally filtered by workflow
    async fn list_runs(&self, workflow: Option<&str>, limit: usize) -> Result<Vec<RunSummary>>;

    /// List all workflow names with at least one recorded run
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or `--no-history`)
pub struct InMemoryPersistence {
    runs: tokio::sync::RwLock<std::collections::HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, workflow: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| workflow.map_or(true, |name| r.workflow_name == name))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.workflow_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a run
pub fn create_summary(run: &WorkflowRun) -> RunSummary {
    RunSummary {
        run_id: run.run_id(),
        workflow_name: run.workflow_name.clone(),
        group: run.group.clone(),
        event: run.event.kind.to_string(),
        ref_name: run.event.ref_name.clone(),
        status: run.state.status,
        started_at: run.state.started_at.unwrap_or_else(Utc::now),
        completed_at: run.state.completed_at,
        total_jobs: run.state.total_jobs,
        completed_jobs: run.state.completed_jobs,
        failed_jobs: run.state.failed_jobs,
        progress: run.state.progress(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, started_at: DateTime<Utc>) -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            workflow_name: name.to_string(),
            group: Some("ci-master".to_string()),
            event: "push".to_string(),
            ref_name: "refs/heads/master".to_string(),
            status: RunStatus::Completed,
            started_at,
            completed_at: Some(started_at),
            total_jobs: 2,
            completed_jobs: 2,
            failed_jobs: 0,
            progress: 1.0,
        }
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = InMemoryPersistence::new();
        let run = summary("linux-tests", Utc::now());
        store.save_run(&run).await.unwrap();

        let loaded = store.load_run(run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.workflow_name, "linux-tests");
        assert_eq!(loaded.group.as_deref(), Some("ci-master"));
    }

    #[tokio::test]
    async fn test_list_runs_filters_and_limits() {
        let store = InMemoryPersistence::new();
        let base = Utc::now();
        for i in 0..3 {
            store
                .save_run(&summary("linux-tests", base + chrono::Duration::seconds(i)))
                .await
                .unwrap();
        }
        store.save_run(&summary("other", base)).await.unwrap();

        let runs = store.list_runs(Some("linux-tests"), 2).await.unwrap();
        assert_eq!(runs.len(), 2);
        // newest first
        assert!(runs[0].started_at >= runs[1].started_at);

        let all = store.list_runs(None, 10).await.unwrap();
        assert_eq!(all.len(), 4);

        let workflows = store.list_workflows().await.unwrap();
        assert_eq!(workflows, vec!["linux-tests".to_string(), "other".to_string()]);
    }
}
