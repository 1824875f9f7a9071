//! One remediation session and its lifecycle.

pub mod state_machine;

use std::sync::{Mutex, PoisonError};

use remedy_core::events::RemediationEvent;
use remedy_core::types::Timestamp;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::RemediationError;
use crate::types::SessionState;

pub use state_machine::validate_transition;

/// A recorded state change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub at: Timestamp,
}

pub struct RemediationSession {
    id: Uuid,
    state: Mutex<SessionState>,
    transitions: Mutex<Vec<Transition>>,
    events: broadcast::Sender<RemediationEvent>,
}

impl RemediationSession {
    pub fn new(events: broadcast::Sender<RemediationEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(SessionState::Inactive),
            transitions: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Move to `to` if the state machine allows it.
    pub fn transition(&self, to: SessionState) -> Result<(), RemediationError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        validate_transition(from, to)?;
        *state = to;
        drop(state);

        let at = Timestamp::now();
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Transition { from, to, at });

        info!(session_id = %self.id, from = %from, to = %to, "Session state changed");
        let _ = self.events.send(RemediationEvent::SessionStateChanged {
            from: from.to_string(),
            to: to.to_string(),
            timestamp: at,
        });
        Ok(())
    }

    /// Move to `Error` unless already terminal.
    pub fn fail(&self, reason: &str) {
        warn!(session_id = %self.id, reason = %reason, "Session failed");
        if let Err(e) = self.transition(SessionState::Error) {
            warn!(session_id = %self.id, error = %e, "Session already finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_walks_lifecycle() {
        let (tx, mut rx) = broadcast::channel(16);
        let session = RemediationSession::new(tx);
        assert_eq!(session.state(), SessionState::Inactive);

        for to in [
            SessionState::Initializing,
            SessionState::Analyzing,
            SessionState::Remediating,
            SessionState::Monitoring,
            SessionState::Completed,
        ] {
            session.transition(to).unwrap();
        }
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.transitions().len(), 5);

        let first = rx.try_recv().unwrap();
        assert_eq!(
            first,
            RemediationEvent::SessionStateChanged {
                from: "inactive".to_string(),
                to: "initializing".to_string(),
                timestamp: first.timestamp(),
            }
        );
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let (tx, _rx) = broadcast::channel(4);
        let session = RemediationSession::new(tx);
        let err = session.transition(SessionState::Monitoring).unwrap_err();
        assert!(matches!(
            err,
            RemediationError::InvalidTransition(SessionState::Inactive, SessionState::Monitoring)
        ));
        assert_eq!(session.state(), SessionState::Inactive);
        assert!(session.transitions().is_empty());
    }

    #[test]
    fn test_fail_is_idempotent() {
        let (tx, _rx) = broadcast::channel(4);
        let session = RemediationSession::new(tx);
        session.transition(SessionState::Initializing).unwrap();
        session.fail("collaborator unavailable");
        assert_eq!(session.state(), SessionState::Error);
        session.fail("again");
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.transitions().len(), 2);
    }
}
