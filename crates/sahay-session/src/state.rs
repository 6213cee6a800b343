//! Session state machine with validated transitions.
//!
//! Enforces the allowed lifecycle transitions:
//! Idle -> Active -> Closing -> Idle
//! Active -> Idle (manual exit skips the closing grace period)

use sahay_core::types::SessionState;

use crate::error::SessionError;

/// Validate that a session state transition is allowed.
///
/// Valid transitions:
/// - Idle -> Active (presence detected or first input)
/// - Active -> Closing (idle timeout grace period)
/// - Active -> Idle (manual exit)
/// - Closing -> Idle (grace period elapsed)
pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), SessionError> {
    let valid = matches!(
        (from, to),
        (SessionState::Idle, SessionState::Active)
            | (SessionState::Active, SessionState::Closing)
            | (SessionState::Active, SessionState::Idle)
            | (SessionState::Closing, SessionState::Idle)
    );

    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidTransition(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Valid transitions
    // =====================================================================

    #[test]
    fn test_idle_to_active() {
        assert!(validate_transition(SessionState::Idle, SessionState::Active).is_ok());
    }

    #[test]
    fn test_active_to_closing() {
        assert!(validate_transition(SessionState::Active, SessionState::Closing).is_ok());
    }

    #[test]
    fn test_active_to_idle() {
        assert!(validate_transition(SessionState::Active, SessionState::Idle).is_ok());
    }

    #[test]
    fn test_closing_to_idle() {
        assert!(validate_transition(SessionState::Closing, SessionState::Idle).is_ok());
    }

    // =====================================================================
    // Invalid transitions
    // =====================================================================

    #[test]
    fn test_idle_to_closing_invalid() {
        assert!(validate_transition(SessionState::Idle, SessionState::Closing).is_err());
    }

    #[test]
    fn test_idle_to_idle_invalid() {
        assert!(validate_transition(SessionState::Idle, SessionState::Idle).is_err());
    }

    #[test]
    fn test_active_to_active_invalid() {
        assert!(validate_transition(SessionState::Active, SessionState::Active).is_err());
    }

    #[test]
    fn test_closing_to_active_invalid() {
        assert!(validate_transition(SessionState::Closing, SessionState::Active).is_err());
    }

    #[test]
    fn test_closing_to_closing_invalid() {
        assert!(validate_transition(SessionState::Closing, SessionState::Closing).is_err());
    }
}
