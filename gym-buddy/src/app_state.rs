use ractor::{Actor, ActorRef};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::session::{CoachSettings, SessionMsg};
use crate::config::AppConfig;
use crate::inference::InferenceProvider;
use crate::store::StateStore;
use crate::supervisor::{SessionSupervisor, SessionSupervisorArgs, SessionSupervisorMsg};
use crate::workflow::{InterviewWorkflow, WorkflowRunner, WorkflowRunnerArgs, WorkflowRunnerMsg, WorkflowStore};

/// Everything the actor system needs at startup.
#[derive(Clone)]
pub struct AppStateConfig {
    pub model: String,
    pub coach: CoachSettings,
    pub interview_answer_wait: Duration,
}

impl From<&AppConfig> for AppStateConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.inference.model.clone(),
            coach: config.coach.clone(),
            interview_answer_wait: config.interview_answer_wait,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    session_supervisor: ActorRef<SessionSupervisorMsg>,
    workflow_runner: ActorRef<WorkflowRunnerMsg>,
    model: String,
}

impl AppState {
    pub fn new(
        session_supervisor: ActorRef<SessionSupervisorMsg>,
        workflow_runner: ActorRef<WorkflowRunnerMsg>,
        model: String,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                session_supervisor,
                workflow_runner,
                model,
            }),
        }
    }

    /// Spawn the session supervisor and the workflow runner over `pool`.
    ///
    /// The runner resumes unfinished workflow runs as part of its startup.
    pub async fn spawn(
        pool: SqlitePool,
        inference: Arc<dyn InferenceProvider>,
        config: AppStateConfig,
    ) -> Result<Self, String> {
        let (session_supervisor, _) = Actor::spawn(
            Some(format!("session_supervisor:{}", ulid::Ulid::new())),
            SessionSupervisor,
            SessionSupervisorArgs {
                store: StateStore::new(pool.clone()),
                inference,
                settings: config.coach,
            },
        )
        .await
        .map_err(|e| e.to_string())?;

        let (workflow_runner, _) = Actor::spawn(
            Some(format!("workflow_runner:{}", ulid::Ulid::new())),
            WorkflowRunner,
            WorkflowRunnerArgs {
                store: WorkflowStore::new(pool),
                workflows: vec![Arc::new(InterviewWorkflow::new(config.interview_answer_wait))],
            },
        )
        .await
        .map_err(|e| e.to_string())?;

        Ok(Self::new(session_supervisor, workflow_runner, config.model))
    }

    /// Model identifier forwarded on every chat turn.
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    pub fn session_supervisor(&self) -> ActorRef<SessionSupervisorMsg> {
        self.inner.session_supervisor.clone()
    }

    pub fn workflow_runner(&self) -> ActorRef<WorkflowRunnerMsg> {
        self.inner.workflow_runner.clone()
    }

    pub async fn get_or_create_session(
        &self,
        session_id: String,
    ) -> Result<ActorRef<SessionMsg>, String> {
        crate::supervisor::get_or_create_session(&self.inner.session_supervisor, session_id).await
    }

    /// Stop the workflow runner and the session supervisor.
    pub fn shutdown(&self) {
        self.inner.workflow_runner.stop(Some("shutdown".to_string()));
        self.inner.session_supervisor.stop(Some("shutdown".to_string()));
    }
}
