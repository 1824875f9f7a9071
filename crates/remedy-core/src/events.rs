use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Timestamp;

/// All domain events emitted by the remediation orchestrator.
///
/// Events are published on a broadcast channel after state changes and
/// consumed by notification sinks, audit listeners, and the CLI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RemediationEvent {
    // =========================================================================
    // Execution
    // =========================================================================
    /// An action ran and its execution function reported success.
    ActionExecuted {
        action_id: String,
        result_id: Uuid,
        duration_ms: u64,
        timestamp: Timestamp,
    },

    /// An action ran and its execution function failed.
    ActionFailed {
        action_id: String,
        result_id: Uuid,
        error: String,
        timestamp: Timestamp,
    },

    /// The constraint evaluator refused a request.
    ExecutionDenied {
        action_id: String,
        reason: String,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Scheduling
    // =========================================================================
    /// A deferred execution was installed (possibly replacing an older one).
    RemediationScheduled {
        action_id: String,
        due_at: Timestamp,
        replaced: bool,
        timestamp: Timestamp,
    },

    /// A pending deferred execution was cancelled.
    ScheduleCancelled {
        action_id: String,
        timestamp: Timestamp,
    },

    /// A timer fired for an action that may not run unattended.
    ConfirmationRequired {
        action_id: String,
        title: String,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Rollback and sessions
    // =========================================================================
    /// A compensating rollback was recorded.
    RolledBack {
        action_id: String,
        original_result_id: Uuid,
        rollback_result_id: Uuid,
        timestamp: Timestamp,
    },

    /// A remediation session moved to a new state.
    SessionStateChanged {
        from: String,
        to: String,
        timestamp: Timestamp,
    },
}

impl RemediationEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            RemediationEvent::ActionExecuted { timestamp, .. }
            | RemediationEvent::ActionFailed { timestamp, .. }
            | RemediationEvent::ExecutionDenied { timestamp, .. }
            | RemediationEvent::RemediationScheduled { timestamp, .. }
            | RemediationEvent::ScheduleCancelled { timestamp, .. }
            | RemediationEvent::ConfirmationRequired { timestamp, .. }
            | RemediationEvent::RolledBack { timestamp, .. }
            | RemediationEvent::SessionStateChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a stable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            RemediationEvent::ActionExecuted { .. } => "action_executed",
            RemediationEvent::ActionFailed { .. } => "action_failed",
            RemediationEvent::ExecutionDenied { .. } => "execution_denied",
            RemediationEvent::RemediationScheduled { .. } => "remediation_scheduled",
            RemediationEvent::ScheduleCancelled { .. } => "schedule_cancelled",
            RemediationEvent::ConfirmationRequired { .. } => "confirmation_required",
            RemediationEvent::RolledBack { .. } => "rolled_back",
            RemediationEvent::SessionStateChanged { .. } => "session_state_changed",
        }
    }

    /// The action this event concerns, if any.
    pub fn action_id(&self) -> Option<&str> {
        match self {
            RemediationEvent::ActionExecuted { action_id, .. }
            | RemediationEvent::ActionFailed { action_id, .. }
            | RemediationEvent::ExecutionDenied { action_id, .. }
            | RemediationEvent::RemediationScheduled { action_id, .. }
            | RemediationEvent::ScheduleCancelled { action_id, .. }
            | RemediationEvent::ConfirmationRequired { action_id, .. }
            | RemediationEvent::RolledBack { action_id, .. } => Some(action_id),
            RemediationEvent::SessionStateChanged { .. } => None,
        }
    }
}
