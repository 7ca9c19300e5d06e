//! HTTP API routes for the gym buddy server
//!
//! Every route that is not matched, including a known path requested with
//! the wrong method, answers `404 Not found` as plain text.

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use shared_types::ErrorResponse;
use std::sync::Arc;

pub mod page;
pub mod session;
pub mod workflow;

use crate::actors::session::SessionError;
use crate::app_state::AppState;
use crate::workflow::WorkflowError;

/// Largest JSON body the chat and workflow routes buffer. Chat text beyond
/// the character limit is cut after parsing, not rejected.
pub const REQUEST_BODY_LIMIT: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub app_state: Arc<AppState>,
}

/// Configure all API routes
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/", get(page::index).fallback(not_found))
        .route("/health", get(health_check).fallback(not_found))
        // Session routes
        .route("/api/start", post(session::start_session).fallback(not_found))
        .route(
            "/api/chat",
            post(session::chat)
                .fallback(not_found)
                .layer(DefaultBodyLimit::max(REQUEST_BODY_LIMIT)),
        )
        // Workflow routes
        .route(
            "/api/start-workflow",
            post(workflow::start_workflow)
                .fallback(not_found)
                .layer(DefaultBodyLimit::max(REQUEST_BODY_LIMIT)),
        )
        .route(
            "/api/workflows/{run_id}",
            get(workflow::get_workflow).fallback(not_found),
        )
        .fallback(not_found)
}

/// Health check endpoint
pub async fn health_check(State(_state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "gym-buddy",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

pub async fn not_found() -> Response {
    not_found_response()
}

/// Plain-text 404 shared by the fallbacks and `ApiError::NotFound`.
pub fn not_found_response() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

/// Response for `CatchPanicLayer`: a panicking handler becomes a generic 500.
pub fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

/// Failures a handler does not answer itself.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found")]
    NotFound,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => not_found_response(),
            other => {
                tracing::error!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}
