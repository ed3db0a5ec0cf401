//! SQLite-based run history store

use crate::core::RunStatus;
use crate::persistence::{PersistenceBackend, RunSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Create a new SQLite store
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}", db_path))
            .await
            .context("failed to connect to run history database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path under the user data dir
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("conveyor");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("failed to create {}", db_dir.display()))?;

        // mode=rwc creates the database file on first use
        let db_path = db_dir.join("runs.db");
        Self::new(&format!("{}?mode=rwc", db_path.display())).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                workflow_name TEXT NOT NULL,
                group_key TEXT,
                event TEXT NOT NULL,
                ref_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                total_jobs INTEGER NOT NULL DEFAULT 0,
                completed_jobs INTEGER NOT NULL DEFAULT 0,
                failed_jobs INTEGER NOT NULL DEFAULT 0,
                progress REAL NOT NULL DEFAULT 0.0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_workflow_name ON runs(workflow_name);
            CREATE INDEX IF NOT EXISTS idx_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<RunSummary> {
        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            workflow_name: row.get("workflow_name"),
            group: row.get("group_key"),
            event: row.get("event"),
            ref_name: row.get("ref_name"),
            status: status_from_str(&row.get::<String, _>("status")),
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            total_jobs: row.get::<i64, _>("total_jobs") as usize,
            completed_jobs: row.get::<i64, _>("completed_jobs") as usize,
            failed_jobs: row.get::<i64, _>("failed_jobs") as usize,
            progress: row.get("progress"),
        })
    }
}

fn status_to_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "Pending",
        RunStatus::Running => "Running",
        RunStatus::Completed => "Completed",
        RunStatus::Failed => "Failed",
        RunStatus::Cancelled => "Cancelled",
    }
}

fn status_from_str(s: &str) -> RunStatus {
    match s {
        "Running" => RunStatus::Running,
        "Completed" => RunStatus::Completed,
        "Failed" => RunStatus::Failed,
        "Cancelled" => RunStatus::Cancelled,
        _ => RunStatus::Pending,
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, workflow_name, group_key, event, ref_name, status, started_at, completed_at,
             total_jobs, completed_jobs, failed_jobs, progress)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(&run.workflow_name)
        .bind(&run.group)
        .bind(&run.event)
        .bind(&run.ref_name)
        .bind(status_to_str(run.status))
        .bind(Self::to_naive(run.started_at))
        .bind(run.completed_at.map(Self::to_naive))
        .bind(run.total_jobs as i64)
        .bind(run.completed_jobs as i64)
        .bind(run.failed_jobs as i64)
        .bind(run.progress)
        .execute(&self.pool)
        .await
        .context("failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query(
            r#"
            SELECT id, workflow_name, group_key, event, ref_name, status, started_at,
                   completed_at, total_jobs, completed_jobs, failed_jobs, progress
            FROM runs
            WHERE id = ?1
            "#,
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("failed to load run")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_summary(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_runs(&self, workflow: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let rows = match workflow {
            Some(name) => {
                sqlx::query(
                    r#"
                    SELECT id, workflow_name, group_key, event, ref_name, status, started_at,
                           completed_at, total_jobs, completed_jobs, failed_jobs, progress
                    FROM runs
                    WHERE workflow_name = ?1
                    ORDER BY started_at DESC
                    LIMIT ?2
                    "#,
                )
                .bind(name)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, workflow_name, group_key, event, ref_name, status, started_at,
                           completed_at, total_jobs, completed_jobs, failed_jobs, progress
                    FROM runs
                    ORDER BY started_at DESC
                    LIMIT ?1
                    "#,
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("failed to list runs")?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT workflow_name
            FROM runs
            ORDER BY workflow_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list workflows")?;

        Ok(rows.iter().map(|row| row.get("workflow_name")).collect())
    }
}
