//! WorkflowRunner - creates, executes and resumes durable workflow runs
//!
//! The runner actor owns the registry of known workflows and the task handle
//! of every run it is executing. Each run executes on its own tokio task so
//! a sleeping run never blocks the actor mailbox.
//!
//! On startup every run still marked `running` in the run-log is resumed.
//! Completed steps are replayed from their stored outputs, so a run that was
//! interrupted continues at the first step it had not finished.

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use shared_types::WorkflowRunRecord;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::AbortHandle;

use super::store::{PendingRun, WorkflowStore};
use super::{Workflow, WorkflowError, WorkflowEvent, WorkflowStep};

#[derive(Debug, Default)]
pub struct WorkflowRunner;

#[derive(Clone)]
pub struct WorkflowRunnerArgs {
    pub store: WorkflowStore,
    pub workflows: Vec<Arc<dyn Workflow>>,
}

pub struct WorkflowRunnerState {
    store: WorkflowStore,
    workflows: HashMap<String, Arc<dyn Workflow>>,
    /// Run id -> executing task
    tasks: HashMap<String, AbortHandle>,
}

#[derive(Debug)]
pub enum WorkflowRunnerMsg {
    /// Persist a new run and start executing it; replies with the run id
    Create {
        workflow: String,
        params: serde_json::Value,
        reply: RpcReplyPort<Result<String, WorkflowError>>,
    },
    /// Run record with its step log
    GetRun {
        run_id: String,
        reply: RpcReplyPort<Result<Option<WorkflowRunRecord>, WorkflowError>>,
    },
    /// Ids of runs currently executing in this process
    ActiveRuns { reply: RpcReplyPort<Vec<String>> },
    /// Sent by a run task once it reached a terminal status
    RunFinished { run_id: String },
}

#[ractor::async_trait]
impl Actor for WorkflowRunner {
    type Msg = WorkflowRunnerMsg;
    type State = WorkflowRunnerState;
    type Arguments = WorkflowRunnerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let workflows = args
            .workflows
            .into_iter()
            .map(|workflow| (workflow.name().to_string(), workflow))
            .collect::<HashMap<_, _>>();

        tracing::info!(
            actor_id = %myself.get_id(),
            workflows = ?workflows.keys().collect::<Vec<_>>(),
            "WorkflowRunner starting"
        );

        Ok(WorkflowRunnerState {
            store: args.store,
            workflows,
            tasks: HashMap::new(),
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        self.resume_pending_runs(&myself, state).await;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkflowRunnerMsg::Create {
                workflow,
                params,
                reply,
            } => {
                let result = self.create_run(&myself, state, workflow, params).await;
                let _ = reply.send(result);
            }
            WorkflowRunnerMsg::GetRun { run_id, reply } => {
                let _ = reply.send(state.store.get_run(&run_id).await);
            }
            WorkflowRunnerMsg::ActiveRuns { reply } => {
                let _ = reply.send(state.tasks.keys().cloned().collect());
            }
            WorkflowRunnerMsg::RunFinished { run_id } => {
                state.tasks.remove(&run_id);
                tracing::debug!(run_id = %run_id, active = state.tasks.len(), "Run task finished");
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // Interrupted runs stay `running` and are resumed on next start.
        for (run_id, task) in state.tasks.drain() {
            tracing::info!(run_id = %run_id, "Interrupting workflow run");
            task.abort();
        }
        tracing::info!(actor_id = %myself.get_id(), "WorkflowRunner stopped");
        Ok(())
    }
}

impl WorkflowRunner {
    async fn create_run(
        &self,
        myself: &ActorRef<WorkflowRunnerMsg>,
        state: &mut WorkflowRunnerState,
        workflow: String,
        params: serde_json::Value,
    ) -> Result<String, WorkflowError> {
        if !state.workflows.contains_key(&workflow) {
            return Err(WorkflowError::UnknownWorkflow(workflow));
        }

        let run_id = ulid::Ulid::new().to_string();
        let pending = state.store.insert_run(&run_id, &workflow, &params).await?;
        tracing::info!(run_id = %run_id, workflow = %workflow, "Workflow run created");

        self.launch(myself, state, pending).await;
        Ok(run_id)
    }

    async fn resume_pending_runs(
        &self,
        myself: &ActorRef<WorkflowRunnerMsg>,
        state: &mut WorkflowRunnerState,
    ) {
        let pending = match state.store.list_running().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(error = %e, "Workflow resume: failed to list running runs");
                return;
            }
        };

        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Resuming unfinished workflow runs");
        }
        for run in pending {
            self.launch(myself, state, run).await;
        }
    }

    async fn launch(
        &self,
        myself: &ActorRef<WorkflowRunnerMsg>,
        state: &mut WorkflowRunnerState,
        pending: PendingRun,
    ) {
        let Some(workflow) = state.workflows.get(&pending.workflow).cloned() else {
            let error = WorkflowError::UnknownWorkflow(pending.workflow.clone()).to_string();
            tracing::warn!(run_id = %pending.run_id, error = %error, "Cannot resume workflow run");
            if let Err(e) = state.store.fail_run(&pending.run_id, &error).await {
                tracing::error!(run_id = %pending.run_id, error = %e, "Failed to mark run as failed");
            }
            return;
        };

        let run_id = pending.run_id.clone();
        let store = state.store.clone();
        let runner = myself.clone();
        let task = tokio::spawn(execute_run(workflow, store.clone(), pending));
        state.tasks.insert(run_id.clone(), task.abort_handle());

        // A panicking run never records its own outcome; an aborted one stays resumable.
        tokio::spawn(async move {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(run_id = %run_id, "Workflow run panicked");
                    if let Err(e) = store.fail_run(&run_id, "workflow panicked").await {
                        tracing::error!(run_id = %run_id, error = %e, "Failed to mark run as failed");
                    }
                }
            }
            let _ = runner.cast(WorkflowRunnerMsg::RunFinished { run_id });
        });
    }
}

/// Drive one run to a terminal status.
async fn execute_run(workflow: Arc<dyn Workflow>, store: WorkflowStore, pending: PendingRun) {
    let run_id = pending.run_id.clone();
    let event = WorkflowEvent {
        run_id: pending.run_id,
        params: pending.params,
        created_at: pending.created_at,
    };

    let result = match WorkflowStep::load(run_id.clone(), store.clone()).await {
        Ok(mut step) => workflow.run(event, &mut step).await,
        Err(e) => Err(e),
    };

    let recorded = match &result {
        Ok(output) => {
            tracing::info!(run_id = %run_id, workflow = workflow.name(), "Workflow run completed");
            store.complete_run(&run_id, output).await
        }
        Err(e) => {
            tracing::error!(run_id = %run_id, workflow = workflow.name(), error = %e, "Workflow run failed");
            store.fail_run(&run_id, &e.to_string()).await
        }
    };
    if let Err(e) = recorded {
        tracing::error!(run_id = %run_id, error = %e, "Failed to record workflow run outcome");
    }
}

// ============================================================================
// Convenience functions
// ============================================================================

pub async fn create_run(
    runner: &ActorRef<WorkflowRunnerMsg>,
    workflow: impl Into<String>,
    params: serde_json::Value,
) -> Result<String, WorkflowError> {
    let workflow = workflow.into();
    ractor::call!(runner, |reply| WorkflowRunnerMsg::Create {
        workflow,
        params,
        reply,
    })
    .map_err(|e| WorkflowError::Unavailable(e.to_string()))?
}

pub async fn get_run(
    runner: &ActorRef<WorkflowRunnerMsg>,
    run_id: impl Into<String>,
) -> Result<Option<WorkflowRunRecord>, WorkflowError> {
    let run_id = run_id.into();
    ractor::call!(runner, |reply| WorkflowRunnerMsg::GetRun { run_id, reply })
        .map_err(|e| WorkflowError::Unavailable(e.to_string()))?
}

pub async fn active_runs(
    runner: &ActorRef<WorkflowRunnerMsg>,
) -> Result<Vec<String>, WorkflowError> {
    ractor::call!(runner, |reply| WorkflowRunnerMsg::ActiveRuns { reply })
        .map_err(|e| WorkflowError::Unavailable(e.to_string()))
}
