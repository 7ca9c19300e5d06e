//! Supervision tree
//!
//! SessionSupervisor
//! └── SessionActor (one per session id, spawned lazily)
//!
//! The supervisor handles:
//! - `ActorFailed`: child crashed; dropped from the registry, respawned on demand
//! - `ActorTerminated`: child stopped; dropped from the registry

pub mod session;

pub use session::{
    get_or_create_session, get_session, SessionSupervisor, SessionSupervisorArgs,
    SessionSupervisorMsg, SessionSupervisorState,
};
