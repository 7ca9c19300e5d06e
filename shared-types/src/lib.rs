//! Shared types between the gym buddy backend and its clients
//!
//! These types describe:
//! - Conversation turns persisted by the session actors
//! - Request/response bodies of the HTTP API
//! - Workflow run records exposed by the workflow runner
//!
//! Serializable with serde for JSON over HTTP. Field names follow the
//! camelCase convention the browser client already speaks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Exercise label used when a session was never started or started without one.
pub const DEFAULT_EXERCISE: &str = "general workout";

/// Role used by `/api/start` and `/api/start-workflow` when the caller omits one.
pub const DEFAULT_ROLE: &str = "software";

/// Chat text is silently cut to this many characters before it reaches a session.
pub const CHAT_TEXT_MAX_CHARS: usize = 4000;

/// User-facing reply when the model call fails.
pub const AI_ERROR_MESSAGE: &str = "Error calling AI. Please try again.";

/// Per-session storage key holding the current exercise label.
pub const SESSION_KEY_EXERCISE: &str = "exercise";

/// Per-session storage key holding the turn history.
pub const SESSION_KEY_HISTORY: &str = "history";

// ============================================================================
// Conversation
// ============================================================================

/// Who authored a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used when rendering a turn into a coaching prompt.
    pub fn speaker_label(&self) -> &'static str {
        match self {
            Role::User => "Client",
            Role::Assistant => "Coach",
        }
    }
}

/// One message in a conversation. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// HTTP API
// ============================================================================

/// Response of `POST /api/start`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub ok: bool,
    pub message: String,
    pub session_id: String,
}

/// Body of `POST /api/chat`
///
/// `text` is kept as raw JSON: clients have been seen sending numbers and
/// nulls, which are coerced rather than rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub text: serde_json::Value,
}

impl ChatRequest {
    /// Text coerced to a string. Falsy values become the empty string;
    /// everything else renders the way a JavaScript `String(..)` would.
    pub fn text_lossy(&self) -> String {
        match &self.text {
            serde_json::Value::Null | serde_json::Value::Bool(false) => String::new(),
            serde_json::Value::Number(n) if n.as_f64() == Some(0.0) => String::new(),
            other => js_string(other),
        }
    }
}

fn js_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
            (_, _, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        // Array elements join with commas; null elements render empty.
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::Null => String::new(),
                other => js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        serde_json::Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Response of `POST /api/chat`, on success and on model failure alike
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    pub user: String,
    pub ai: String,
}

/// Body of `POST /api/start-workflow`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartWorkflowRequest {
    #[serde(default)]
    pub role: Option<String>,
}

/// Response of `POST /api/start-workflow`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartWorkflowResponse {
    pub workflow: String,
    pub status: String,
}

/// Generic error body for unexpected failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Workflows
// ============================================================================

/// Lifecycle of a workflow run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Running,
    Completed,
    Failed,
}

impl WorkflowRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Persisted output of one completed step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepRecord {
    pub name: String,
    pub output: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

/// A workflow run as returned by `GET /api/workflows/{runId}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunRecord {
    pub id: String,
    pub workflow: String,
    pub status: WorkflowRunStatus,
    pub params: serde_json::Value,
    pub steps: Vec<WorkflowStepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input of the interview workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterviewParams {
    pub role: String,
}

/// Terminal record produced by the interview workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterviewEvaluation {
    pub score: u8,
    pub pros: String,
    pub cons: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_serializes_lowercase_role() {
        let turn = Turn::user("how's my form?");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "how's my form?"}));

        let back: Turn = serde_json::from_value(json!({"role": "assistant", "content": "ok"})).unwrap();
        assert_eq!(back, Turn::assistant("ok"));
    }

    #[test]
    fn test_speaker_labels() {
        assert_eq!(Role::User.speaker_label(), "Client");
        assert_eq!(Role::Assistant.speaker_label(), "Coach");
    }

    #[test]
    fn test_chat_request_text_coercion() {
        let cases = [
            (json!({"text": "hi"}), "hi"),
            (json!({}), ""),
            (json!({"text": null}), ""),
            (json!({"text": false}), ""),
            (json!({"text": 0}), ""),
            (json!({"text": 42}), "42"),
            (json!({"text": true}), "true"),
            (json!({"text": 1.0}), "1"),
            (json!({"text": 2.5}), "2.5"),
            (json!({"text": -0.0}), ""),
            (json!({"text": ["a", 1, null, [2, 3]]}), "a,1,,2,3"),
            (json!({"text": []}), ""),
            (json!({"text": {"k": "v"}}), "[object Object]"),
        ];
        for (body, expected) in cases {
            let req: ChatRequest = serde_json::from_value(body.clone()).unwrap();
            assert_eq!(req.text_lossy(), expected, "body: {body}");
        }
    }

    #[test]
    fn test_chat_request_reads_camel_case_session_id() {
        let req: ChatRequest =
            serde_json::from_value(json!({"sessionId": "abc", "text": "yo"})).unwrap();
        assert_eq!(req.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_start_response_uses_camel_case() {
        let resp = StartResponse {
            ok: true,
            message: "hi".to_string(),
            session_id: "s-1".to_string(),
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["sessionId"], "s-1");
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_workflow_status_parse() {
        for status in [
            WorkflowRunStatus::Running,
            WorkflowRunStatus::Completed,
            WorkflowRunStatus::Failed,
        ] {
            assert_eq!(WorkflowRunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(WorkflowRunStatus::parse("paused"), None);
        assert!(!WorkflowRunStatus::Running.is_terminal());
        assert!(WorkflowRunStatus::Failed.is_terminal());
    }
}
