pub mod session;

pub use session::{
    CoachSettings, SessionActor, SessionArguments, SessionError, SessionMsg, SessionSnapshot,
};
