//! Workflow endpoints: start an interview run, inspect a run.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use shared_types::{
    InterviewParams, StartWorkflowRequest, StartWorkflowResponse, WorkflowRunRecord, DEFAULT_ROLE,
};

use crate::api::{ApiError, ApiState};
use crate::workflow::interview::INTERVIEW_WORKFLOW;
use crate::workflow::runner::{create_run, get_run};
use crate::workflow::WorkflowError;

/// POST /api/start-workflow with `{role?}`; a missing or unreadable body counts as `{}`.
pub async fn start_workflow(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<StartWorkflowResponse>, ApiError> {
    let request: StartWorkflowRequest = serde_json::from_slice(&body).unwrap_or_default();
    let role = request
        .role
        .filter(|role| !role.is_empty())
        .unwrap_or_else(|| DEFAULT_ROLE.to_string());

    let params = serde_json::to_value(InterviewParams { role: role.clone() })
        .map_err(WorkflowError::from)?;

    let runner = state.app_state.workflow_runner();
    let run_id = create_run(&runner, INTERVIEW_WORKFLOW, params).await?;
    tracing::info!(run_id = %run_id, role = %role, "Interview workflow started");

    Ok(Json(StartWorkflowResponse {
        workflow: run_id,
        status: "started".to_string(),
    }))
}

/// GET /api/workflows/{run_id}
pub async fn get_workflow(
    State(state): State<ApiState>,
    Path(run_id): Path<String>,
) -> Result<Json<WorkflowRunRecord>, ApiError> {
    let runner = state.app_state.workflow_runner();
    get_run(&runner, run_id).await?.map(Json).ok_or(ApiError::NotFound)
}
