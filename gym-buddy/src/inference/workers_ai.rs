//! Workers AI REST client
//!
//! `POST {base_url}/accounts/{account_id}/ai/run/{model}` with a bearer token.
//! The API wraps results in `{ "success": bool, "result": ..., "errors": [...] }`.

use async_trait::async_trait;
use serde::Deserialize;

use super::{InferenceError, InferenceProvider, InferenceRequest};
use crate::config::InferenceConfig;

pub struct WorkersAiProvider {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<EnvelopeMessage>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMessage {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

impl WorkersAiProvider {
    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let account_id = config.account_id.clone().ok_or_else(|| {
            InferenceError::NotConfigured("CLOUDFLARE_ACCOUNT_ID is not set".to_string())
        })?;
        let api_token = config.api_token.clone().ok_or_else(|| {
            InferenceError::NotConfigured("CLOUDFLARE_API_TOKEN is not set".to_string())
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InferenceError::Request(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_id,
            api_token,
        })
    }

    fn run_url(&self, model: &str) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url,
            self.account_id,
            model.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl InferenceProvider for WorkersAiProvider {
    fn name(&self) -> &str {
        "workers-ai"
    }

    async fn run(
        &self,
        model: &str,
        request: &InferenceRequest,
    ) -> Result<serde_json::Value, InferenceError> {
        let started = tokio::time::Instant::now();
        let response = self
            .http
            .post(self.run_url(model))
            .bearer_auth(&self.api_token)
            .json(request)
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        tracing::debug!(
            model,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Workers AI call finished"
        );

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        if !envelope.success {
            let detail = envelope
                .errors
                .iter()
                .map(|e| match e.code {
                    Some(code) => format!("{code}: {}", e.message),
                    None => e.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(InferenceError::Provider(if detail.is_empty() {
                "unknown error".to_string()
            } else {
                detail
            }));
        }

        envelope
            .result
            .ok_or_else(|| InferenceError::InvalidResponse("missing result".to_string()))
    }
}
