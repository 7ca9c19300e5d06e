//! Run-log persistence for the workflow runner.
//!
//! ```sql
//! workflow_runs(run_id PK, workflow, params, status, output, error,
//!               created_at, updated_at, completed_at)
//! workflow_steps(run_id, step_name, output, completed_at,
//!                PRIMARY KEY (run_id, step_name))
//! ```
//!
//! `params`, `output` and step outputs are JSON text.

use chrono::{DateTime, Utc};
use shared_types::{WorkflowRunRecord, WorkflowRunStatus, WorkflowStepRecord};
use sqlx::SqlitePool;

use super::WorkflowError;

/// A run that has not reached a terminal status yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRun {
    pub run_id: String,
    pub workflow: String,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

type RunRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

#[derive(Debug, Clone)]
pub struct WorkflowStore {
    pool: SqlitePool,
}

impl WorkflowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workflow_runs (
                run_id        TEXT PRIMARY KEY,
                workflow      TEXT NOT NULL,
                params        TEXT NOT NULL,
                status        TEXT NOT NULL,
                output        TEXT,
                error         TEXT,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                completed_at  TEXT
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS workflow_steps (
                run_id        TEXT NOT NULL,
                step_name     TEXT NOT NULL,
                output        TEXT NOT NULL,
                completed_at  TEXT NOT NULL,
                PRIMARY KEY (run_id, step_name)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_workflow_runs_status ON workflow_runs(status)")
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn insert_run(
        &self,
        run_id: &str,
        workflow: &str,
        params: &serde_json::Value,
    ) -> Result<PendingRun, WorkflowError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO workflow_runs (run_id, workflow, params, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(workflow)
        .bind(serde_json::to_string(params)?)
        .bind(WorkflowRunStatus::Running.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(PendingRun {
            run_id: run_id.to_string(),
            workflow: workflow.to_string(),
            params: params.clone(),
            created_at: now,
        })
    }

    /// Runs still in `running` status, oldest first.
    pub async fn list_running(&self) -> Result<Vec<PendingRun>, WorkflowError> {
        let rows: Vec<(String, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT run_id, workflow, params, created_at FROM workflow_runs
             WHERE status = ? ORDER BY rowid ASC",
        )
        .bind(WorkflowRunStatus::Running.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(run_id, workflow, params, created_at)| {
                Ok(PendingRun {
                    run_id,
                    workflow,
                    params: serde_json::from_str(&params)?,
                    created_at,
                })
            })
            .collect()
    }

    /// Completed steps of a run in completion order.
    pub async fn load_steps(&self, run_id: &str) -> Result<Vec<WorkflowStepRecord>, WorkflowError> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT step_name, output, completed_at FROM workflow_steps
             WHERE run_id = ? ORDER BY rowid ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(name, output, completed_at)| {
                Ok(WorkflowStepRecord {
                    name,
                    output: serde_json::from_str(&output)?,
                    completed_at,
                })
            })
            .collect()
    }

    /// Persist a step output. A step that is already recorded keeps its first output.
    pub async fn record_step(
        &self,
        run_id: &str,
        step_name: &str,
        output: &serde_json::Value,
    ) -> Result<WorkflowStepRecord, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR IGNORE INTO workflow_steps (run_id, step_name, output, completed_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(step_name)
        .bind(serde_json::to_string(output)?)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE workflow_runs SET updated_at = ? WHERE run_id = ?")
            .bind(now)
            .bind(run_id)
            .execute(&mut *tx)
            .await?;

        let (output, completed_at): (String, DateTime<Utc>) = sqlx::query_as(
            "SELECT output, completed_at FROM workflow_steps WHERE run_id = ? AND step_name = ?",
        )
        .bind(run_id)
        .bind(step_name)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(WorkflowStepRecord {
            name: step_name.to_string(),
            output: serde_json::from_str(&output)?,
            completed_at,
        })
    }

    pub async fn complete_run(
        &self,
        run_id: &str,
        output: &serde_json::Value,
    ) -> Result<(), WorkflowError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE workflow_runs SET status = ?, output = ?, updated_at = ?, completed_at = ?
             WHERE run_id = ?",
        )
        .bind(WorkflowRunStatus::Completed.as_str())
        .bind(serde_json::to_string(output)?)
        .bind(now)
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_run(&self, run_id: &str, error: &str) -> Result<(), WorkflowError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE workflow_runs SET status = ?, error = ?, updated_at = ?, completed_at = ?
             WHERE run_id = ?",
        )
        .bind(WorkflowRunStatus::Failed.as_str())
        .bind(error)
        .bind(now)
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Run record with its step log, `None` for an unknown id.
    pub async fn get_run(&self, run_id: &str) -> Result<Option<WorkflowRunRecord>, WorkflowError> {
        let row: Option<RunRow> = sqlx::query_as(
            "SELECT run_id, workflow, params, status, output, error, created_at, updated_at, completed_at
             FROM workflow_runs WHERE run_id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, workflow, params, status, output, error, created_at, updated_at, completed_at)) =
            row
        else {
            return Ok(None);
        };

        let status = WorkflowRunStatus::parse(&status)
            .ok_or_else(|| WorkflowError::Corrupt(format!("unknown run status '{status}'")))?;
        let output = output.map(|raw| serde_json::from_str(&raw)).transpose()?;
        let steps = self.load_steps(&id).await?;

        Ok(Some(WorkflowRunRecord {
            id,
            workflow,
            status,
            params: serde_json::from_str(&params)?,
            steps,
            output,
            error,
            created_at,
            updated_at,
            completed_at,
        }))
    }
}
