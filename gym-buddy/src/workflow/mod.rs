//! Durable workflows
//!
//! A [`Workflow`] is a linear sequence of named steps driven through a
//! [`WorkflowStep`] handle. The [`runner::WorkflowRunner`] actor creates runs,
//! executes each on its own task, and resumes unfinished runs on startup by
//! replaying the step outputs already persisted in [`store::WorkflowStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod interview;
pub mod runner;
pub mod step;
pub mod store;

pub use interview::InterviewWorkflow;
pub use runner::{WorkflowRunner, WorkflowRunnerArgs, WorkflowRunnerMsg};
pub use step::WorkflowStep;
pub use store::WorkflowStore;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("step '{step}' failed: {message}")]
    Step { step: String, message: String },

    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("corrupt run-log: {0}")]
    Corrupt(String),

    #[error("workflow runner unavailable: {0}")]
    Unavailable(String),
}

/// Input handed to a workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowEvent {
    pub run_id: String,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Workflow: Send + Sync {
    /// Name persisted with each run and used to find the workflow on resume.
    fn name(&self) -> &str;

    async fn run(
        &self,
        event: WorkflowEvent,
        step: &mut WorkflowStep,
    ) -> Result<serde_json::Value, WorkflowError>;
}
