//! Orchestrator-level value objects: session states, statistics, reports.

use remedy_core::config::RemediationConfig;
use remedy_core::types::{Parameters, RemediationAction, RemediationResult, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Session lifecycle
// =============================================================================

/// Remediation session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Inactive,
    Initializing,
    Analyzing,
    Remediating,
    Monitoring,
    Completed,
    Error,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Inactive => write!(f, "inactive"),
            SessionState::Initializing => write!(f, "initializing"),
            SessionState::Analyzing => write!(f, "analyzing"),
            SessionState::Remediating => write!(f, "remediating"),
            SessionState::Monitoring => write!(f, "monitoring"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(SessionState::Inactive),
            "initializing" => Ok(SessionState::Initializing),
            "analyzing" => Ok(SessionState::Analyzing),
            "remediating" => Ok(SessionState::Remediating),
            "monitoring" => Ok(SessionState::Monitoring),
            "completed" => Ok(SessionState::Completed),
            "error" => Ok(SessionState::Error),
            _ => Err(format!("Unknown session state: {}", s)),
        }
    }
}

// =============================================================================
// Projections
// =============================================================================

/// Aggregate counters over the history store plus live gauges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub rollbacks: usize,
    pub executions_last_24h: usize,
    pub failures_last_24h: usize,
    /// Successful / total, 0.0 when nothing ran yet.
    pub success_rate: f64,
    /// Keyed by action type name; only actions still in the catalog count.
    pub by_action_type: BTreeMap<String, usize>,
    /// Keyed by urgency name; only actions still in the catalog count.
    pub by_urgency: BTreeMap<String, usize>,
    pub active_executions: usize,
    pub scheduled_remediations: usize,
    pub pending_confirmations: usize,
}

/// A pending deferred execution, as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRemediation {
    pub action_id: String,
    pub due_at: Timestamp,
    pub parameters: Parameters,
}

/// Full snapshot of the orchestrator for audit and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedReport {
    pub generated_at: Timestamp,
    pub session_state: SessionState,
    pub config: RemediationConfig,
    pub statistics: ExecutionStatistics,
    pub catalog: Vec<RemediationAction>,
    pub scheduled: Vec<ScheduledRemediation>,
    pub pending_confirmations: Vec<String>,
    pub recommendations: Vec<RemediationAction>,
    /// Most recent results, oldest first.
    pub recent_history: Vec<RemediationResult>,
}

/// What a full remediation session did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub evidence_session_id: Option<String>,
    pub final_state: SessionState,
    pub recommended: Vec<String>,
    pub results: Vec<RemediationResult>,
    /// `(action_id, reason)` for recommendations that were not executed.
    pub skipped: Vec<(String, String)>,
    pub statistics: ExecutionStatistics,
}
