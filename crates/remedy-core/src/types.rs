use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{RemedyError, Result};

/// Key/value configuration passed to execution functions and returned by them.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Enums
// =============================================================================

/// Category of corrective work an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ConfigurationChange,
    CodeModification,
    DependencyUpdate,
    EnvironmentSetup,
    DatabaseOperation,
    PlatformSpecificFix,
    Rollback,
    Monitoring,
    Prevention,
}

impl ActionType {
    pub const ALL: [ActionType; 9] = [
        ActionType::ConfigurationChange,
        ActionType::CodeModification,
        ActionType::DependencyUpdate,
        ActionType::EnvironmentSetup,
        ActionType::DatabaseOperation,
        ActionType::PlatformSpecificFix,
        ActionType::Rollback,
        ActionType::Monitoring,
        ActionType::Prevention,
    ];
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::ConfigurationChange => write!(f, "configuration_change"),
            ActionType::CodeModification => write!(f, "code_modification"),
            ActionType::DependencyUpdate => write!(f, "dependency_update"),
            ActionType::EnvironmentSetup => write!(f, "environment_setup"),
            ActionType::DatabaseOperation => write!(f, "database_operation"),
            ActionType::PlatformSpecificFix => write!(f, "platform_specific_fix"),
            ActionType::Rollback => write!(f, "rollback"),
            ActionType::Monitoring => write!(f, "monitoring"),
            ActionType::Prevention => write!(f, "prevention"),
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|t| t.to_string() == s)
            .ok_or_else(|| format!("Unknown action type: {}", s))
    }
}

/// How pressing an action is. Declaration order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Critical,
    Emergency,
}

impl Urgency {
    pub const ALL: [Urgency; 5] = [
        Urgency::Low,
        Urgency::Normal,
        Urgency::High,
        Urgency::Critical,
        Urgency::Emergency,
    ];
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Low => write!(f, "low"),
            Urgency::Normal => write!(f, "normal"),
            Urgency::High => write!(f, "high"),
            Urgency::Critical => write!(f, "critical"),
            Urgency::Emergency => write!(f, "emergency"),
        }
    }
}

impl std::str::FromStr for Urgency {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Urgency::Low),
            "normal" => Ok(Urgency::Normal),
            "high" => Ok(Urgency::High),
            "critical" => Ok(Urgency::Critical),
            "emergency" => Ok(Urgency::Emergency),
            _ => Err(format!("Unknown urgency: {}", s)),
        }
    }
}

/// Policy governing whether an action may run unattended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Runs without human involvement.
    Automatic,
    /// Requires external confirmation before firing.
    SemiAutomatic,
    /// Instructions only; never fired by a timer.
    Manual,
    /// Never executable.
    Disabled,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Automatic => write!(f, "automatic"),
            ExecutionMode::SemiAutomatic => write!(f, "semi_automatic"),
            ExecutionMode::Manual => write!(f, "manual"),
            ExecutionMode::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(ExecutionMode::Automatic),
            "semi_automatic" => Ok(ExecutionMode::SemiAutomatic),
            "manual" => Ok(ExecutionMode::Manual),
            "disabled" => Ok(ExecutionMode::Disabled),
            _ => Err(format!("Unknown execution mode: {}", s)),
        }
    }
}

// =============================================================================
// Timestamp
// =============================================================================

/// Unix timestamp in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// Seconds elapsed from `earlier` to `self`. Negative if `earlier` is later.
    pub fn seconds_since(&self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Saturates at the `i64` bounds.
    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    pub fn minus_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_sub(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

// =============================================================================
// Catalog entry
// =============================================================================

/// A catalog entry describing a candidate fix, its risk profile, and how it
/// may be triggered.
///
/// Invariant: `success_rate` lies in `[0, 1]` (see [`RemediationAction::validate`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub id: String,
    pub title: String,
    pub description: String,
    pub action_type: ActionType,
    pub urgency: Urgency,
    pub execution_mode: ExecutionMode,
    /// Named preconditions. Advisory: unmet ones become warnings.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Human-readable procedure. Documentation only, never executed.
    #[serde(default)]
    pub steps: Vec<String>,
    /// Defaults merged under per-invocation overrides.
    #[serde(default)]
    pub parameters: Parameters,
    /// Presence is the sole gate for rollback eligibility.
    #[serde(default)]
    pub rollback_plan: Option<String>,
    /// Expected duration in seconds.
    pub estimated_time_secs: u64,
    pub success_rate: f64,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    pub target_issue: String,
    #[serde(default)]
    pub metadata: Parameters,
}

impl RemediationAction {
    /// Create an action with empty descriptive lists and parameters.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        action_type: ActionType,
        urgency: Urgency,
        execution_mode: ExecutionMode,
        success_rate: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            action_type,
            urgency,
            execution_mode,
            prerequisites: Vec::new(),
            steps: Vec::new(),
            parameters: Parameters::new(),
            rollback_plan: None,
            estimated_time_secs: 0,
            success_rate,
            risks: Vec::new(),
            benefits: Vec::new(),
            target_issue: String::new(),
            metadata: Parameters::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_rollback_plan(mut self, plan: impl Into<String>) -> Self {
        self.rollback_plan = Some(plan.into());
        self
    }

    pub fn with_parameter(mut self, key: &str, value: serde_json::Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn with_prerequisites(mut self, prerequisites: &[&str]) -> Self {
        self.prerequisites = prerequisites.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_target_issue(mut self, target: impl Into<String>) -> Self {
        self.target_issue = target.into();
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RemedyError::InvalidAction("id must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(RemedyError::InvalidAction(format!(
                "success_rate {} for '{}' is outside [0, 1]",
                self.success_rate, self.id
            )));
        }
        Ok(())
    }

    pub fn is_rollback_eligible(&self) -> bool {
        self.rollback_plan.is_some()
    }
}

// =============================================================================
// Execution outcome
// =============================================================================

/// Link from a rollback result to the result it compensates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub original_result_id: Uuid,
}

/// Outcome of one execution attempt. Immutable once created.
///
/// Invariant: `error_message.is_some() == !success`. The constructors below
/// are the only way the rest of the system builds results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationResult {
    pub id: Uuid,
    /// Catalog id by value; the action may since have been replaced or removed.
    pub action_id: String,
    pub executed_at: Timestamp,
    pub actual_time_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
    pub execution_details: Parameters,
    pub warnings: Vec<String>,
    pub rollback_info: Option<RollbackInfo>,
}

impl RemediationResult {
    pub fn succeeded(
        action_id: impl Into<String>,
        executed_at: Timestamp,
        actual_time_ms: u64,
        execution_details: Parameters,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_id: action_id.into(),
            executed_at,
            actual_time_ms,
            success: true,
            error_message: None,
            execution_details,
            warnings,
            rollback_info: None,
        }
    }

    /// Build a failed result. The error text is also stored under
    /// `execution_details["error"]`.
    pub fn failed(
        action_id: impl Into<String>,
        executed_at: Timestamp,
        actual_time_ms: u64,
        error_message: impl Into<String>,
        mut execution_details: Parameters,
        warnings: Vec<String>,
    ) -> Self {
        let error_message = error_message.into();
        execution_details.insert(
            "error".to_string(),
            serde_json::Value::String(error_message.clone()),
        );
        Self {
            id: Uuid::new_v4(),
            action_id: action_id.into(),
            executed_at,
            actual_time_ms,
            success: false,
            error_message: Some(error_message),
            execution_details,
            warnings,
            rollback_info: None,
        }
    }

    pub fn rolled_back(
        action_id: impl Into<String>,
        original_result_id: Uuid,
        executed_at: Timestamp,
        actual_time_ms: u64,
        execution_details: Parameters,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_id: action_id.into(),
            executed_at,
            actual_time_ms,
            success: true,
            error_message: None,
            execution_details,
            warnings: Vec::new(),
            rollback_info: Some(RollbackInfo { original_result_id }),
        }
    }

    pub fn is_rollback(&self) -> bool {
        self.rollback_info.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_type_display_and_from_str() {
        for t in ActionType::ALL {
            let parsed: ActionType = t.to_string().parse().unwrap();
            assert_eq!(parsed, t);
        }
        assert_eq!(ActionType::PlatformSpecificFix.to_string(), "platform_specific_fix");
        assert!("bogus".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(Urgency::Low < Urgency::Normal);
        assert!(Urgency::Normal < Urgency::High);
        assert!(Urgency::High < Urgency::Critical);
        assert!(Urgency::Critical < Urgency::Emergency);
        assert_eq!(Urgency::ALL.iter().max(), Some(&Urgency::Emergency));
    }

    #[test]
    fn test_urgency_from_str() {
        assert_eq!("critical".parse::<Urgency>().unwrap(), Urgency::Critical);
        assert!("urgent".parse::<Urgency>().is_err());
    }

    #[test]
    fn test_execution_mode_serde_names() {
        let json = serde_json::to_string(&ExecutionMode::SemiAutomatic).unwrap();
        assert_eq!(json, "\"semi_automatic\"");
        assert_eq!(
            "semi_automatic".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::SemiAutomatic
        );
    }

    #[test]
    fn test_action_json_round_trip_preserves_all_fields() {
        let action = RemediationAction::new(
            "sqlite_fallback",
            "Switch to unencrypted storage",
            ActionType::PlatformSpecificFix,
            Urgency::High,
            ExecutionMode::SemiAutomatic,
            0.95,
        )
        .with_description("Fall back to plain SQLite when SQLCipher is unavailable")
        .with_rollback_plan("Re-enable encrypted storage")
        .with_parameter("preserve_data", json!(true))
        .with_prerequisites(&["database_backup_available"])
        .with_target_issue("encrypted storage compatibility");

        let json = serde_json::to_string(&action).unwrap();
        let rt: RemediationAction = serde_json::from_str(&json).unwrap();
        assert_eq!(rt, action);
        assert_eq!(rt.success_rate, 0.95);
        assert_eq!(rt.urgency, Urgency::High);
        assert_eq!(rt.execution_mode, ExecutionMode::SemiAutomatic);
    }

    #[test]
    fn test_action_validate_rejects_out_of_range_success_rate() {
        let mut action = RemediationAction::new(
            "a",
            "A",
            ActionType::Monitoring,
            Urgency::Low,
            ExecutionMode::Automatic,
            1.2,
        );
        assert!(action.validate().is_err());
        action.success_rate = -0.1;
        assert!(action.validate().is_err());
        action.success_rate = 1.0;
        assert!(action.validate().is_ok());
    }

    #[test]
    fn test_action_validate_rejects_empty_id() {
        let action = RemediationAction::new(
            "  ",
            "A",
            ActionType::Monitoring,
            Urgency::Low,
            ExecutionMode::Automatic,
            0.5,
        );
        assert!(matches!(action.validate(), Err(RemedyError::InvalidAction(_))));
    }

    #[test]
    fn test_failed_result_carries_error_in_details() {
        let result = RemediationResult::failed(
            "optimize_pragmas",
            Timestamp(1_700_000_000),
            12,
            "PRAGMA journal_mode failed",
            Parameters::new(),
            vec![],
        );
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("PRAGMA journal_mode failed"));
        assert_eq!(
            result.execution_details.get("error"),
            Some(&json!("PRAGMA journal_mode failed"))
        );
    }

    #[test]
    fn test_succeeded_result_has_no_error() {
        let result = RemediationResult::succeeded(
            "dependency_check",
            Timestamp::now(),
            3,
            Parameters::new(),
            vec!["note".to_string()],
        );
        assert!(result.success);
        assert!(result.error_message.is_none());
        assert!(!result.is_rollback());
    }

    #[test]
    fn test_rolled_back_result_links_original() {
        let original = Uuid::new_v4();
        let result =
            RemediationResult::rolled_back("sqlite_fallback", original, Timestamp::now(), 1, Parameters::new());
        assert!(result.is_rollback());
        assert_eq!(result.rollback_info.unwrap().original_result_id, original);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp(1_000);
        assert_eq!(t.plus_secs(60).seconds_since(t), 60);
        assert_eq!(t.minus_secs(10), Timestamp(990));
        assert_eq!(Timestamp(0).to_datetime().timestamp(), 0);
    }

    #[test]
    fn test_timestamp_arithmetic_saturates() {
        let t = Timestamp(1_000);
        assert_eq!(t.plus_secs(i64::MAX), Timestamp(i64::MAX));
        assert_eq!(Timestamp(-1_000).minus_secs(i64::MAX), Timestamp(i64::MIN));
    }
}
