use thiserror::Error;

use sahay_core::error::SahayError;
use sahay_core::types::SessionState;

/// Errors raised by session lifecycle operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A session is already active")]
    AlreadyActive,

    #[error("No active session")]
    NoActiveSession,

    #[error("Invalid session transition: {0} -> {1}")]
    InvalidTransition(SessionState, SessionState),

    #[error("Session lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<SessionError> for SahayError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadyActive => SahayError::SessionAlreadyActive,
            SessionError::NoActiveSession => SahayError::NoActiveSession,
            other => SahayError::Session(other.to_string()),
        }
    }
}
