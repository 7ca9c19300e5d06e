//! SessionActor - one coaching conversation, persisted per session key
//!
//! Each session id maps to exactly one actor (see `SessionSupervisor`). The
//! actor mailbox is the serialization point: a chat turn for a key is fully
//! processed, model call included, before the next message for that key is
//! handled.
//!
//! Durable state lives in the session's key-value storage under two keys:
//!
//! - `exercise`: current activity label
//! - `history`: ordered list of [`Turn`]s, append-only
//!
//! A failed model call leaves `history` exactly as it was before the turn.
//!
//! An actor that receives no request for `idle_timeout` stops itself; the
//! supervisor forgets it and the next request respawns it from storage.

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use shared_types::{
    ChatResponse, Turn, DEFAULT_EXERCISE, SESSION_KEY_EXERCISE, SESSION_KEY_HISTORY,
};
use std::sync::Arc;
use std::time::Duration;

use crate::inference::{reply_text, CoachingContext, InferenceError, InferenceProvider, InferenceRequest};
use crate::store::{SessionStorage, StoreError};

const PERSONA_PREAMBLE: &str = "You are an expert personal trainer and fitness coach. Keep responses SHORT and concise (max 100 words). Be direct and actionable.";

/// Sampling, prompt and lifetime parameters, fixed for the lifetime of a session actor.
#[derive(Debug, Clone, PartialEq)]
pub struct CoachSettings {
    pub max_tokens: u32,
    pub temperature: f64,
    /// Number of most recent turns rendered into the prompt
    pub history_window: usize,
    /// Quiet period after which the actor stops itself
    pub idle_timeout: Duration,
}

impl Default for CoachSettings {
    fn default() -> Self {
        Self {
            max_tokens: 150,
            temperature: 0.7,
            history_window: 6,
            idle_timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Actor that owns one session's conversation
#[derive(Debug, Default)]
pub struct SessionActor;

/// Arguments for spawning SessionActor
#[derive(Clone)]
pub struct SessionArguments {
    pub session_id: String,
    pub storage: SessionStorage,
    pub inference: Arc<dyn InferenceProvider>,
    pub settings: CoachSettings,
}

pub struct SessionState {
    session_id: String,
    storage: SessionStorage,
    inference: Arc<dyn InferenceProvider>,
    settings: CoachSettings,
    /// Bumped on every request; an idle check from an older generation is stale.
    activity: u64,
}

/// Persisted view of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub exercise: String,
    pub history: Vec<Turn>,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub enum SessionMsg {
    /// Set the exercise, clear history, reply with a greeting
    Start {
        role: Option<String>,
        reply: RpcReplyPort<Result<String, SessionError>>,
    },
    /// Run one chat turn against the model
    Chat {
        text: String,
        model: String,
        reply: RpcReplyPort<Result<ChatResponse, SessionError>>,
    },
    /// Read the persisted exercise and history
    GetSnapshot {
        reply: RpcReplyPort<Result<SessionSnapshot, SessionError>>,
    },
    /// Scheduled by the actor itself; stops it if nothing arrived since
    IdleCheck { activity: u64 },
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("AI inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Session actor unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Prompt helpers
// ============================================================================

/// Exercise label for a start request; blank counts as absent.
pub fn resolve_exercise(role: Option<&str>) -> String {
    match role {
        Some(role) if !role.is_empty() => role.to_string(),
        _ => DEFAULT_EXERCISE.to_string(),
    }
}

pub fn greeting(exercise: &str) -> String {
    format!("Let's crush {exercise}! 💪 Tell me about your workout or ask for tips.")
}

/// Render the coaching prompt from the last `window` turns of `history`.
pub fn build_prompt(exercise: &str, history: &[Turn], window: usize) -> String {
    let start = history.len().saturating_sub(window);
    let conversation = history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.speaker_label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{PERSONA_PREAMBLE}\n\nCurrent Exercise: {exercise}\n\nPrevious conversation:\n{conversation}\n\nRespond briefly with specific advice:"
    )
}

// ============================================================================
// Actor
// ============================================================================

#[ractor::async_trait]
impl Actor for SessionActor {
    type Msg = SessionMsg;
    type State = SessionState;
    type Arguments = SessionArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            session_id = %args.session_id,
            provider = args.inference.name(),
            "SessionActor starting"
        );

        let state = SessionState {
            session_id: args.session_id,
            storage: args.storage,
            inference: args.inference,
            settings: args.settings,
            activity: 0,
        };
        schedule_idle_check(&myself, &state);
        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let SessionMsg::IdleCheck { activity } = message {
            if activity == state.activity {
                tracing::info!(
                    session_id = %state.session_id,
                    idle_secs = state.settings.idle_timeout.as_secs(),
                    "SessionActor idle, stopping"
                );
                myself.stop(Some("idle".to_string()));
            }
            return Ok(());
        }

        state.activity += 1;
        match message {
            SessionMsg::Start { role, reply } => {
                let result = self.handle_start(role, state).await;
                let _ = reply.send(result);
            }
            SessionMsg::Chat { text, model, reply } => {
                let result = self.handle_chat(text, model, state).await;
                let _ = reply.send(result);
            }
            SessionMsg::GetSnapshot { reply } => {
                let result = self.load_snapshot(state).await;
                let _ = reply.send(result);
            }
            SessionMsg::IdleCheck { .. } => {}
        }
        schedule_idle_check(&myself, state);
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            session_id = %state.session_id,
            "SessionActor stopped"
        );
        Ok(())
    }
}

fn schedule_idle_check(myself: &ActorRef<SessionMsg>, state: &SessionState) {
    let activity = state.activity;
    let _ = myself.send_after(state.settings.idle_timeout, move || SessionMsg::IdleCheck { activity });
}

impl SessionActor {
    async fn handle_start(
        &self,
        role: Option<String>,
        state: &mut SessionState,
    ) -> Result<String, SessionError> {
        let exercise = resolve_exercise(role.as_deref());
        state
            .storage
            .put_all(&[
                (SESSION_KEY_EXERCISE, serde_json::json!(exercise)),
                (SESSION_KEY_HISTORY, serde_json::json!([])),
            ])
            .await?;

        tracing::info!(session_id = %state.session_id, exercise = %exercise, "Session started");
        Ok(greeting(&exercise))
    }

    async fn handle_chat(
        &self,
        text: String,
        model: String,
        state: &mut SessionState,
    ) -> Result<ChatResponse, SessionError> {
        let SessionSnapshot {
            exercise,
            mut history,
        } = self.load_snapshot(state).await?;

        history.push(Turn::user(text.clone()));

        let request = InferenceRequest {
            prompt: build_prompt(&exercise, &history, state.settings.history_window),
            max_tokens: state.settings.max_tokens,
            temperature: state.settings.temperature,
            context: CoachingContext {
                exercise,
                user_text: text.clone(),
            },
        };

        // The user turn above is only in memory; on failure it is dropped.
        let result = match state.inference.run(&model, &request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    session_id = %state.session_id,
                    provider = state.inference.name(),
                    model = %model,
                    error = %e,
                    "AI inference failed"
                );
                return Err(SessionError::Inference(e));
            }
        };

        let ai = reply_text(&result);
        history.push(Turn::assistant(ai.clone()));
        state.storage.put(SESSION_KEY_HISTORY, &history).await?;

        tracing::debug!(
            session_id = %state.session_id,
            turns = history.len(),
            "Chat turn persisted"
        );
        Ok(ChatResponse { user: text, ai })
    }

    async fn load_snapshot(&self, state: &SessionState) -> Result<SessionSnapshot, SessionError> {
        let history: Vec<Turn> = state
            .storage
            .get(SESSION_KEY_HISTORY)
            .await?
            .unwrap_or_default();
        let exercise: String = state
            .storage
            .get(SESSION_KEY_EXERCISE)
            .await?
            .unwrap_or_else(|| DEFAULT_EXERCISE.to_string());
        Ok(SessionSnapshot { exercise, history })
    }
}

// ============================================================================
// Convenience functions
// ============================================================================

pub async fn start_session(
    session: &ActorRef<SessionMsg>,
    role: Option<String>,
) -> Result<String, SessionError> {
    ractor::call!(session, |reply| SessionMsg::Start { role, reply })
        .map_err(|e| SessionError::Unavailable(e.to_string()))?
}

pub async fn chat_turn(
    session: &ActorRef<SessionMsg>,
    text: String,
    model: String,
) -> Result<ChatResponse, SessionError> {
    ractor::call!(session, |reply| SessionMsg::Chat { text, model, reply })
        .map_err(|e| SessionError::Unavailable(e.to_string()))?
}

pub async fn get_snapshot(session: &ActorRef<SessionMsg>) -> Result<SessionSnapshot, SessionError> {
    ractor::call!(session, |reply| SessionMsg::GetSnapshot { reply })
        .map_err(|e| SessionError::Unavailable(e.to_string()))?
}

// ============================================================================
// Tests
// ============================================================================
