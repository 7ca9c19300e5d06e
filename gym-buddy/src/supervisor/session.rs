//! Session Supervisor - resolves the SessionActor for a session key
//!
//! The SessionSupervisor is responsible for:
//! - Creating one SessionActor per session id on first use
//! - Returning the same actor for every later request with that id
//! - Forgetting actors that failed or stopped (including idle actors that
//!   stopped themselves), so the next request respawns them from durable
//!   storage
//!
//! Lookups and spawns happen inside the supervisor's own mailbox, so two
//! concurrent requests for a new key never create two actors.

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::actors::session::{CoachSettings, SessionActor, SessionArguments, SessionMsg};
use crate::inference::InferenceProvider;
use crate::store::StateStore;

#[derive(Debug, Default)]
pub struct SessionSupervisor;

#[derive(Clone)]
pub struct SessionSupervisorArgs {
    pub store: StateStore,
    pub inference: Arc<dyn InferenceProvider>,
    pub settings: CoachSettings,
}

pub struct SessionSupervisorState {
    /// Session id -> live actor
    pub sessions: HashMap<String, ActorRef<SessionMsg>>,
    pub store: StateStore,
    pub inference: Arc<dyn InferenceProvider>,
    pub settings: CoachSettings,
}

#[derive(Debug)]
pub enum SessionSupervisorMsg {
    /// Get existing SessionActor or create a new one
    GetOrCreateSession {
        session_id: String,
        reply: RpcReplyPort<Result<ActorRef<SessionMsg>, String>>,
    },
    /// Get existing SessionActor if one is live
    GetSession {
        session_id: String,
        reply: RpcReplyPort<Option<ActorRef<SessionMsg>>>,
    },
    /// Number of live session actors
    CountSessions { reply: RpcReplyPort<usize> },
}

impl SessionSupervisor {
    fn forget_actor(&self, actor_id: ractor::ActorId, state: &mut SessionSupervisorState) -> Option<String> {
        let session_id = state
            .sessions
            .iter()
            .find(|(_, actor)| actor.get_id() == actor_id)
            .map(|(session_id, _)| session_id.clone())?;
        state.sessions.remove(&session_id);
        Some(session_id)
    }
}

#[ractor::async_trait]
impl Actor for SessionSupervisor {
    type Msg = SessionSupervisorMsg;
    type State = SessionSupervisorState;
    type Arguments = SessionSupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(supervisor = %myself.get_id(), "SessionSupervisor starting");
        Ok(SessionSupervisorState {
            sessions: HashMap::new(),
            store: args.store,
            inference: args.inference,
            settings: args.settings,
        })
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        event: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match event {
            SupervisionEvent::ActorFailed(actor_cell, error) => {
                let session_id = self.forget_actor(actor_cell.get_id(), state);
                warn!(
                    supervisor = %myself.get_id(),
                    failed_actor = %actor_cell.get_id(),
                    session_id = ?session_id,
                    error = %error,
                    "SessionActor failed - will respawn on next request"
                );
            }
            SupervisionEvent::ActorTerminated(actor_cell, _, reason) => {
                let session_id = self.forget_actor(actor_cell.get_id(), state);
                info!(
                    supervisor = %myself.get_id(),
                    actor = %actor_cell.get_id(),
                    session_id = ?session_id,
                    reason = ?reason,
                    "SessionActor terminated"
                );
            }
            _ => {}
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SessionSupervisorMsg::GetOrCreateSession { session_id, reply } => {
                if let Some(actor) = state.sessions.get(&session_id) {
                    let _ = reply.send(Ok(actor.clone()));
                    return Ok(());
                }

                let args = SessionArguments {
                    session_id: session_id.clone(),
                    storage: state.store.scoped(session_id.clone()),
                    inference: state.inference.clone(),
                    settings: state.settings.clone(),
                };
                match Actor::spawn_linked(None, SessionActor, args, myself.get_cell()).await {
                    Ok((actor, _)) => {
                        info!(session_id = %session_id, actor_id = %actor.get_id(), "Created SessionActor");
                        state.sessions.insert(session_id, actor.clone());
                        let _ = reply.send(Ok(actor));
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Failed to spawn SessionActor");
                        let _ = reply.send(Err(e.to_string()));
                    }
                }
            }
            SessionSupervisorMsg::GetSession { session_id, reply } => {
                let _ = reply.send(state.sessions.get(&session_id).cloned());
            }
            SessionSupervisorMsg::CountSessions { reply } => {
                let _ = reply.send(state.sessions.len());
            }
        }
        Ok(())
    }
}

/// Convenience function to resolve the actor for a session id
pub async fn get_or_create_session(
    supervisor: &ActorRef<SessionSupervisorMsg>,
    session_id: impl Into<String>,
) -> Result<ActorRef<SessionMsg>, String> {
    let session_id = session_id.into();
    ractor::call!(supervisor, |reply| SessionSupervisorMsg::GetOrCreateSession {
        session_id,
        reply,
    })
    .map_err(|e| e.to_string())?
}

/// Convenience function to look up a live session actor
pub async fn get_session(
    supervisor: &ActorRef<SessionSupervisorMsg>,
    session_id: impl Into<String>,
) -> Result<Option<ActorRef<SessionMsg>>, ractor::RactorErr<SessionSupervisorMsg>> {
    ractor::call!(supervisor, |reply| SessionSupervisorMsg::GetSession {
        session_id: session_id.into(),
        reply,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::session::{chat_turn, get_snapshot, start_session};
    use crate::db::connect_in_memory;
    use crate::inference::CannedCoachProvider;

    async fn spawn_supervisor() -> ActorRef<SessionSupervisorMsg> {
        spawn_supervisor_with(CoachSettings::default()).await
    }

    async fn spawn_supervisor_with(settings: CoachSettings) -> ActorRef<SessionSupervisorMsg> {
        let store = StateStore::new(connect_in_memory().await.unwrap());
        let (supervisor, _handle) = Actor::spawn(
            None,
            SessionSupervisor,
            SessionSupervisorArgs {
                store,
                inference: Arc::new(CannedCoachProvider),
                settings,
            },
        )
        .await
        .unwrap();
        supervisor
    }

    async fn count(supervisor: &ActorRef<SessionSupervisorMsg>) -> usize {
        ractor::call!(supervisor, |reply| SessionSupervisorMsg::CountSessions { reply }).unwrap()
    }

    #[tokio::test]
    async fn test_same_key_resolves_same_actor() {
        let supervisor = spawn_supervisor().await;
        let a = get_or_create_session(&supervisor, "k1").await.unwrap();
        let b = get_or_create_session(&supervisor, "k1").await.unwrap();
        let c = get_or_create_session(&supervisor, "k2").await.unwrap();

        assert_eq!(a.get_id(), b.get_id());
        assert_ne!(a.get_id(), c.get_id());
        assert_eq!(count(&supervisor).await, 2);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let supervisor = spawn_supervisor().await;
        let a = get_or_create_session(&supervisor, "a").await.unwrap();
        let b = get_or_create_session(&supervisor, "b").await.unwrap();

        start_session(&a, Some("squats".to_string())).await.unwrap();
        start_session(&b, Some("cycling".to_string())).await.unwrap();
        chat_turn(&a, "form check".to_string(), "m".to_string()).await.unwrap();

        assert_eq!(get_snapshot(&a).await.unwrap().history.len(), 2);
        let b_snapshot = get_snapshot(&b).await.unwrap();
        assert_eq!(b_snapshot.exercise, "cycling");
        assert!(b_snapshot.history.is_empty());
    }

    #[tokio::test]
    async fn test_stopped_actor_is_respawned_with_state() {
        let supervisor = spawn_supervisor().await;
        let first = get_or_create_session(&supervisor, "k").await.unwrap();
        start_session(&first, Some("swimming".to_string())).await.unwrap();

        first.stop(None);
        // Wait until the supervisor has processed the termination event.
        for _ in 0..50 {
            if get_session(&supervisor, "k").await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(get_session(&supervisor, "k").await.unwrap().is_none());

        let second = get_or_create_session(&supervisor, "k").await.unwrap();
        assert_ne!(first.get_id(), second.get_id());
        assert_eq!(get_snapshot(&second).await.unwrap().exercise, "swimming");
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let supervisor = spawn_supervisor_with(CoachSettings {
            idle_timeout: std::time::Duration::from_millis(200),
            ..CoachSettings::default()
        })
        .await;

        let busy = get_or_create_session(&supervisor, "busy").await.unwrap();
        get_or_create_session(&supervisor, "quiet").await.unwrap();

        // Keep one session active past the timeout.
        for _ in 0..6 {
            get_snapshot(&busy).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        }
        assert!(get_session(&supervisor, "quiet").await.unwrap().is_none());
        assert_eq!(
            get_session(&supervisor, "busy").await.unwrap().map(|a| a.get_id()),
            Some(busy.get_id())
        );

        for _ in 0..100 {
            if count(&supervisor).await == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(count(&supervisor).await, 0);
    }
}
