//! Model inference - the collaborator session actors call for coach replies
//!
//! A provider receives a model identifier and an [`InferenceRequest`] and
//! returns the raw result value, which may be a bare string or an object
//! carrying a `response` field. [`reply_text`] normalizes both shapes.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::{InferenceBackend, InferenceConfig};

pub mod canned;
pub mod workers_ai;

pub use canned::CannedCoachProvider;
pub use workers_ai::WorkersAiProvider;

/// Body sent to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InferenceRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Structured view of the prompt for providers that do not read it.
    #[serde(skip)]
    pub context: CoachingContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoachingContext {
    pub exercise: String,
    pub user_text: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum InferenceError {
    #[error("inference request failed: {0}")]
    Request(String),

    #[error("inference provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference provider reported failure: {0}")]
    Provider(String),

    #[error("invalid inference response: {0}")]
    InvalidResponse(String),

    #[error("inference provider not configured: {0}")]
    NotConfigured(String),
}

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn run(
        &self,
        model: &str,
        request: &InferenceRequest,
    ) -> Result<serde_json::Value, InferenceError>;
}

/// Extract the reply text from a raw inference result.
///
/// A string is used as-is, an object with a non-empty string `response`
/// yields that field, anything else is returned as its JSON text.
pub fn reply_text(result: &serde_json::Value) -> String {
    if let Some(text) = result.as_str() {
        return text.to_string();
    }
    match result.get("response").and_then(|v| v.as_str()) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => result.to_string(),
    }
}

/// Build the provider selected by configuration.
pub fn build_provider(
    config: &InferenceConfig,
) -> Result<Arc<dyn InferenceProvider>, InferenceError> {
    match config.backend {
        InferenceBackend::WorkersAi => Ok(Arc::new(WorkersAiProvider::from_config(config)?)),
        InferenceBackend::Canned => Ok(Arc::new(CannedCoachProvider)),
        InferenceBackend::Auto if config.has_credentials() => {
            Ok(Arc::new(WorkersAiProvider::from_config(config)?))
        }
        InferenceBackend::Auto => {
            tracing::warn!(
                "CLOUDFLARE_ACCOUNT_ID/CLOUDFLARE_API_TOKEN not set; using canned coach replies"
            );
            Ok(Arc::new(CannedCoachProvider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_reply_text_from_string() {
        assert_eq!(reply_text(&json!("Keep your back straight.")), "Keep your back straight.");
    }

    #[test]
    fn test_reply_text_from_response_field() {
        assert_eq!(
            reply_text(&json!({"response": "Brace your core.", "usage": {}})),
            "Brace your core."
        );
    }

    #[test]
    fn test_reply_text_falls_back_to_json() {
        assert_eq!(reply_text(&json!({"tokens": 3})), r#"{"tokens":3}"#);
        assert_eq!(reply_text(&json!({"response": ""})), r#"{"response":""}"#);
        assert_eq!(reply_text(&json!({"response": 7})), r#"{"response":7}"#);
    }

    #[test]
    fn test_request_serializes_without_context() {
        let request = InferenceRequest {
            prompt: "p".to_string(),
            max_tokens: 150,
            temperature: 0.7,
            context: CoachingContext {
                exercise: "squats".to_string(),
                user_text: "hi".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"prompt": "p", "max_tokens": 150, "temperature": 0.7})
        );
    }

    fn config(backend: InferenceBackend, with_credentials: bool) -> InferenceConfig {
        InferenceConfig {
            backend,
            model: "m".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            account_id: with_credentials.then(|| "acct".to_string()),
            api_token: with_credentials.then(|| "token".to_string()),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_build_provider_selection() {
        let auto_without = build_provider(&config(InferenceBackend::Auto, false)).unwrap();
        assert_eq!(auto_without.name(), "canned");

        let auto_with = build_provider(&config(InferenceBackend::Auto, true)).unwrap();
        assert_eq!(auto_with.name(), "workers-ai");

        let err = build_provider(&config(InferenceBackend::WorkersAi, false))
            .err()
            .expect("missing credentials must fail");
        assert!(matches!(err, InferenceError::NotConfigured(_)));
    }
}
