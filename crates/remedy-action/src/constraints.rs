//! Pure admission check for a single execution request.
//!
//! [`evaluate`] reads nothing but its arguments, so callers snapshot the
//! live gauges and history first and pass them in as a [`ConstraintState`].

use std::fmt;

use remedy_core::types::{ExecutionMode, RemediationAction, Timestamp};
use serde::{Deserialize, Serialize};

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    AutomaticExecutionDisabled,
    MaxConcurrentReached,
    SuccessRateBelowThreshold,
    InCooldown,
    /// The action's mode is `disabled`. Not bypassed by `force`.
    ActionDisabled,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::AutomaticExecutionDisabled => write!(f, "automatic execution disabled"),
            DenyReason::MaxConcurrentReached => write!(f, "max concurrent actions reached"),
            DenyReason::SuccessRateBelowThreshold => write!(f, "success rate below threshold"),
            DenyReason::InCooldown => write!(f, "action in cooldown"),
            DenyReason::ActionDisabled => write!(f, "action disabled"),
        }
    }
}

/// Everything the evaluator looks at besides the action itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintState {
    pub allow_automatic_execution: bool,
    pub active_executions: usize,
    pub max_concurrent_actions: usize,
    pub min_success_rate: f64,
    pub cooldown_secs: u64,
    /// When the action last produced a result, successful or not.
    pub last_executed_at: Option<Timestamp>,
    /// Another run of the same action has not produced its result yet.
    pub in_flight: bool,
    pub now: Timestamp,
}

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Decide whether `action` may run now. The first failing check wins:
/// automatic flag, concurrency ceiling, success rate, cooldown. A run of
/// the same action that is still in flight counts as cooldown.
pub fn evaluate(action: &RemediationAction, state: &ConstraintState) -> Decision {
    if action.execution_mode == ExecutionMode::Automatic && !state.allow_automatic_execution {
        return Decision::deny(DenyReason::AutomaticExecutionDisabled);
    }

    if state.active_executions >= state.max_concurrent_actions {
        return Decision::deny(DenyReason::MaxConcurrentReached);
    }

    if action.success_rate < state.min_success_rate {
        return Decision::deny(DenyReason::SuccessRateBelowThreshold);
    }

    if state.in_flight && state.cooldown_secs > 0 {
        return Decision::deny(DenyReason::InCooldown);
    }

    if let Some(last) = state.last_executed_at {
        let elapsed = state.now.seconds_since(last);
        if elapsed < state.cooldown_secs as i64 {
            return Decision::deny(DenyReason::InCooldown);
        }
    }

    Decision::allow()
}
