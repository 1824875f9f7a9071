//! Confirmation queue for deferred actions that may not run unattended.
//!
//! When a scheduled `semi_automatic` or `manual` action comes due it is not
//! executed; it is parked here until an operator confirms or dismisses it.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use remedy_core::types::{Parameters, Timestamp};

/// An action waiting for operator approval.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub action_id: String,
    /// Title shown to the operator.
    pub title: String,
    /// Parameters captured when the action was scheduled.
    pub parameters: Parameters,
    pub requested_at: Timestamp,
}

/// Holds at most one pending confirmation per action id, in request order.
#[derive(Default)]
pub struct ConfirmationGate {
    pending: Mutex<VecDeque<PendingConfirmation>>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a confirmation request. A newer request for the same action
    /// replaces the older one and moves to the back of the queue.
    pub fn request(&self, action_id: &str, title: &str, parameters: Parameters) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|p| p.action_id != action_id);
        pending.push_back(PendingConfirmation {
            action_id: action_id.to_string(),
            title: title.to_string(),
            parameters,
            requested_at: Timestamp::now(),
        });
    }

    /// Remove and return the pending confirmation for `action_id`.
    pub fn approve(&self, action_id: &str) -> Option<PendingConfirmation> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = pending.iter().position(|p| p.action_id == action_id)?;
        pending.remove(pos)
    }

    /// Drop the pending confirmation for `action_id`.
    ///
    /// Returns `true` if one was found.
    pub fn dismiss(&self, action_id: &str) -> bool {
        self.approve(action_id).is_some()
    }

    pub fn pending(&self) -> Vec<PendingConfirmation> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear(&self) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
