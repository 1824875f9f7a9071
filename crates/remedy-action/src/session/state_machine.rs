//! Session state machine with validated transitions.
//!
//! Inactive -> Initializing -> Analyzing -> Remediating -> Monitoring -> Completed
//! Any non-terminal state -> Error

use crate::error::RemediationError;
use crate::types::SessionState;

/// Validate that a session transition is allowed.
pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), RemediationError> {
    let valid = matches!(
        (from, to),
        (SessionState::Inactive, SessionState::Initializing)
            | (SessionState::Initializing, SessionState::Analyzing)
            | (SessionState::Analyzing, SessionState::Remediating)
            | (SessionState::Remediating, SessionState::Monitoring)
            | (SessionState::Monitoring, SessionState::Completed)
    ) || (to == SessionState::Error && !from.is_terminal());

    if valid {
        Ok(())
    } else {
        Err(RemediationError::InvalidTransition(from, to))
    }
}
