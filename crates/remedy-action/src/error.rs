//! Error types for the remediation engine.
//!
//! Two channels: [`RemediationError`] is returned synchronously for
//! precondition and configuration faults, while [`ExecutionError`] is what
//! execution functions report and is always folded into a failed result.

use crate::constraints::DenyReason;
use crate::types::SessionState;
use remedy_core::error::RemedyError;
use uuid::Uuid;

/// Errors surfaced to callers of the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum RemediationError {
    #[error("Remediation action not found: {0}")]
    ActionNotFound(String),
    #[error("Remediation result not found: {0}")]
    ResultNotFound(Uuid),
    #[error("Execution of '{action_id}' blocked: {reason}")]
    ConstraintViolation { action_id: String, reason: DenyReason },
    #[error("No execution function bound to action: {0}")]
    ConfigurationFault(String),
    #[error("No rollback plan declared for action: {0}")]
    RollbackUnavailable(String),
    #[error("No confirmation pending for action: {0}")]
    NoPendingConfirmation(String),
    #[error("Invalid session transition: {0} -> {1}")]
    InvalidTransition(SessionState, SessionState),
    #[error("Execution task for '{action_id}' did not complete: {reason}")]
    ExecutionAborted { action_id: String, reason: String },
    #[error("Scheduler failed: {0}")]
    Scheduler(String),
    #[error("Orchestrator has been disposed")]
    Disposed,
    #[error(transparent)]
    Core(#[from] RemedyError),
}

impl RemediationError {
    /// The deny reason, when this is a constraint violation.
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            RemediationError::ConstraintViolation { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Failures reported by an execution function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("Execution function failed: {0}")]
    HandlerFailed(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Execution function panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remediation_error_display() {
        let err = RemediationError::ActionNotFound("nope".to_string());
        assert_eq!(err.to_string(), "Remediation action not found: nope");

        let err = RemediationError::ConstraintViolation {
            action_id: "optimize_pragmas".to_string(),
            reason: DenyReason::AutomaticExecutionDisabled,
        };
        assert_eq!(
            err.to_string(),
            "Execution of 'optimize_pragmas' blocked: automatic execution disabled"
        );

        let err = RemediationError::ConfigurationFault("dependency_check".to_string());
        assert_eq!(
            err.to_string(),
            "No execution function bound to action: dependency_check"
        );

        let err = RemediationError::RollbackUnavailable("dependency_check".to_string());
        assert_eq!(
            err.to_string(),
            "No rollback plan declared for action: dependency_check"
        );
    }

    #[test]
    fn test_result_not_found_preserves_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let err = RemediationError::ResultNotFound(id);
        assert_eq!(
            err.to_string(),
            "Remediation result not found: 550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = RemediationError::InvalidTransition(SessionState::Completed, SessionState::Analyzing);
        assert_eq!(err.to_string(), "Invalid session transition: completed -> analyzing");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: RemediationError = RemedyError::Storage("disk full".to_string()).into();
        assert!(matches!(err, RemediationError::Core(_)));
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_deny_reason_accessor() {
        let err = RemediationError::ConstraintViolation {
            action_id: "a".to_string(),
            reason: DenyReason::InCooldown,
        };
        assert_eq!(err.deny_reason(), Some(&DenyReason::InCooldown));
        assert!(RemediationError::Disposed.deny_reason().is_none());
    }

    #[test]
    fn test_execution_error_display() {
        assert_eq!(
            ExecutionError::HandlerFailed("database is locked".to_string()).to_string(),
            "Execution function failed: database is locked"
        );
        assert_eq!(
            ExecutionError::InvalidParameters("missing factory".to_string()).to_string(),
            "Invalid parameters: missing factory"
        );
    }
}
