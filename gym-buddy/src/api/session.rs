//! Session endpoints: start a workout, send a chat turn.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared_types::{
    ChatRequest, ChatResponse, StartResponse, AI_ERROR_MESSAGE, CHAT_TEXT_MAX_CHARS, DEFAULT_ROLE,
};

use crate::actors::session::{chat_turn, start_session as start_session_actor, SessionError};
use crate::api::{ApiError, ApiState};

#[derive(Debug, Default, PartialEq)]
pub struct StartQuery {
    pub session_id: Option<String>,
    pub role: Option<String>,
}

impl StartQuery {
    /// First value of each known parameter; repeats and unknown keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "sessionId" => &mut query.session_id,
                "role" => &mut query.role,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

/// Session key from the client, or a fresh one when absent or blank.
fn session_id_or_new(session_id: Option<String>) -> String {
    match session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// POST /api/start?sessionId=&role=
pub async fn start_session(
    State(state): State<ApiState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<StartResponse>, ApiError> {
    let query = StartQuery::from_pairs(pairs);
    let session_id = session_id_or_new(query.session_id);
    // Only an absent role falls back here; an empty one reaches the session as-is.
    let role = query.role.unwrap_or_else(|| DEFAULT_ROLE.to_string());

    let session = state
        .app_state
        .get_or_create_session(session_id.clone())
        .await
        .map_err(ApiError::Internal)?;
    let message = start_session_actor(&session, Some(role)).await?;

    Ok(Json(StartResponse {
        ok: true,
        message,
        session_id,
    }))
}

/// POST /api/chat with `{sessionId?, text}`
pub async fn chat(State(state): State<ApiState>, body: Bytes) -> Result<Response, ApiError> {
    let request: ChatRequest = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(serde_json::Value::Null) => {
            return Err(ApiError::InvalidBody("body is null".to_string()));
        }
        Ok(serde_json::Value::Object(fields)) => ChatRequest {
            session_id: fields.get("sessionId").and_then(session_id_field),
            text: fields.get("text").cloned().unwrap_or_default(),
        },
        // Other JSON values carry neither field.
        Ok(_) => ChatRequest::default(),
        Err(e) => return Err(ApiError::InvalidBody(e.to_string())),
    };

    let session_id = session_id_or_new(request.session_id.clone());
    let text = truncate_chars(&request.text_lossy(), CHAT_TEXT_MAX_CHARS);

    let session = state
        .app_state
        .get_or_create_session(session_id.clone())
        .await
        .map_err(ApiError::Internal)?;

    match chat_turn(&session, text.clone(), state.app_state.model().to_string()).await {
        Ok(reply) => Ok((StatusCode::OK, Json(reply)).into_response()),
        Err(SessionError::Inference(e)) => {
            tracing::warn!(session_id = %session_id, error = %e, "Chat turn failed at inference");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatResponse {
                    user: text,
                    ai: AI_ERROR_MESSAGE.to_string(),
                }),
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// `sessionId` as a key: strings as-is, other scalars by their text, null as absent.
fn session_id_field(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
