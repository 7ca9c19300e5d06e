use std::time::Duration;

use crate::actors::session::CoachSettings;

pub const DEFAULT_MODEL: &str = "@cf/meta/llama-3.3-70b-instruct-fp8-fast";
pub const DEFAULT_INFERENCE_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Which inference backend to build at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceBackend {
    /// Workers AI when credentials are present, canned coach otherwise.
    Auto,
    WorkersAi,
    Canned,
}

impl InferenceBackend {
    fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "workers-ai" | "workers_ai" => Ok(Self::WorkersAi),
            "canned" => Ok(Self::Canned),
            other => Err(anyhow::anyhow!(
                "Invalid INFERENCE_PROVIDER '{other}'. Expected 'auto', 'workers-ai' or 'canned'"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub backend: InferenceBackend,
    /// Model identifier passed to every chat turn
    pub model: String,
    pub base_url: String,
    pub account_id: Option<String>,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl InferenceConfig {
    pub fn has_credentials(&self) -> bool {
        self.account_id.is_some() && self.api_token.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// SQLite URL, e.g. `sqlite:./data/gym-buddy.db` or `sqlite::memory:`
    pub database_url: String,
    pub inference: InferenceConfig,
    pub coach: CoachSettings,
    /// How long the interview workflow waits for an answer
    pub interview_answer_wait: Duration,
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup; `from_env` reads the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = CoachSettings::default();

        Ok(Self {
            host: get("GYM_BUDDY_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("GYM_BUDDY_PORT"), "GYM_BUDDY_PORT", 8787)?,
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./data/gym-buddy.db".to_string()),
            inference: InferenceConfig {
                backend: match get("INFERENCE_PROVIDER") {
                    Some(value) => InferenceBackend::parse(&value)?,
                    None => InferenceBackend::Auto,
                },
                model: get("GYM_BUDDY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: get("INFERENCE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_INFERENCE_BASE_URL.to_string()),
                account_id: get("CLOUDFLARE_ACCOUNT_ID"),
                api_token: get("CLOUDFLARE_API_TOKEN"),
                timeout: Duration::from_millis(parse_or(
                    get("INFERENCE_TIMEOUT_MS"),
                    "INFERENCE_TIMEOUT_MS",
                    60_000,
                )?),
            },
            coach: CoachSettings {
                max_tokens: parse_or(get("COACH_MAX_TOKENS"), "COACH_MAX_TOKENS", defaults.max_tokens)?,
                temperature: parse_or(
                    get("COACH_TEMPERATURE"),
                    "COACH_TEMPERATURE",
                    defaults.temperature,
                )?,
                history_window: parse_or(
                    get("COACH_HISTORY_WINDOW"),
                    "COACH_HISTORY_WINDOW",
                    defaults.history_window,
                )?,
                idle_timeout: Duration::from_secs(parse_or(
                    get("SESSION_IDLE_TIMEOUT_SECS"),
                    "SESSION_IDLE_TIMEOUT_SECS",
                    defaults.idle_timeout.as_secs(),
                )?),
            },
            interview_answer_wait: Duration::from_secs(parse_or(
                get("INTERVIEW_ANSWER_WAIT_SECS"),
                "INTERVIEW_ANSWER_WAIT_SECS",
                10,
            )?),
            cors_allowed_origins: match get("CORS_ALLOWED_ORIGINS") {
                Some(raw) => split_csv(&raw),
                None => vec![
                    "http://localhost:8787".to_string(),
                    "http://127.0.0.1:8787".to_string(),
                ],
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        None => Ok(default),
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8787");
        assert_eq!(config.database_url, "sqlite:./data/gym-buddy.db");
        assert_eq!(config.inference.model, DEFAULT_MODEL);
        assert_eq!(config.inference.backend, InferenceBackend::Auto);
        assert!(!config.inference.has_credentials());
        assert_eq!(config.coach.max_tokens, 150);
        assert_eq!(config.coach.history_window, 6);
        assert_eq!(config.interview_answer_wait, Duration::from_secs(10));
        assert_eq!(config.coach.idle_timeout, Duration::from_secs(900));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("GYM_BUDDY_PORT", "9000"),
            ("GYM_BUDDY_MODEL", "@cf/test/model"),
            ("INFERENCE_PROVIDER", "canned"),
            ("CLOUDFLARE_ACCOUNT_ID", "acct"),
            ("CLOUDFLARE_API_TOKEN", "token"),
            ("COACH_TEMPERATURE", "0.2"),
            ("SESSION_IDLE_TIMEOUT_SECS", "60"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.inference.model, "@cf/test/model");
        assert_eq!(config.inference.backend, InferenceBackend::Canned);
        assert!(config.inference.has_credentials());
        assert_eq!(config.coach.temperature, 0.2);
        assert_eq!(config.coach.idle_timeout, Duration::from_secs(60));
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("GYM_BUDDY_PORT", "  "), ("CLOUDFLARE_API_TOKEN", "")]).unwrap();
        assert_eq!(config.port, 8787);
        assert!(config.inference.api_token.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = config_from(&[("GYM_BUDDY_PORT", "not-a-port")]).unwrap_err();
        assert!(err.to_string().contains("GYM_BUDDY_PORT"));

        let err = config_from(&[("INFERENCE_PROVIDER", "openai")]).unwrap_err();
        assert!(err.to_string().contains("INFERENCE_PROVIDER"));
    }
}
