//! Boundaries to the collaborators that feed the orchestrator.
//!
//! Hypothesis generation, compatibility testing, health scoring and the
//! evidence log all live outside this crate. The orchestrator only sees the
//! traits below; [`StaticSignals`] and [`NoopEvidenceLog`] are fixed-value
//! implementations for tests and the CLI.

use std::fmt;

use async_trait::async_trait;
use remedy_core::error::RemedyError;
use remedy_core::types::Parameters;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Signal types
// =============================================================================

/// Root-cause families a hypothesis can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisCategory {
    PlatformFactoryMismatch,
    PragmaCommandFailure,
    EncryptedStorageCompatibility,
    CorruptedDatabase,
    MissingDependencies,
    Other,
}

impl fmt::Display for HypothesisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HypothesisCategory::PlatformFactoryMismatch => write!(f, "platform_factory_mismatch"),
            HypothesisCategory::PragmaCommandFailure => write!(f, "pragma_command_failure"),
            HypothesisCategory::EncryptedStorageCompatibility => {
                write!(f, "encrypted_storage_compatibility")
            }
            HypothesisCategory::CorruptedDatabase => write!(f, "corrupted_database"),
            HypothesisCategory::MissingDependencies => write!(f, "missing_dependencies"),
            HypothesisCategory::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for HypothesisCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform_factory_mismatch" => Ok(HypothesisCategory::PlatformFactoryMismatch),
            "pragma_command_failure" => Ok(HypothesisCategory::PragmaCommandFailure),
            "encrypted_storage_compatibility" => {
                Ok(HypothesisCategory::EncryptedStorageCompatibility)
            }
            "corrupted_database" => Ok(HypothesisCategory::CorruptedDatabase),
            "missing_dependencies" => Ok(HypothesisCategory::MissingDependencies),
            "other" => Ok(HypothesisCategory::Other),
            _ => Err(format!("Unknown hypothesis category: {}", s)),
        }
    }
}

/// A candidate explanation for an observed failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub category: HypothesisCategory,
    pub description: String,
    /// Engine-assigned confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Hypothesis {
    pub fn new(category: HypothesisCategory, description: impl Into<String>, confidence: f64) -> Self {
        Self {
            category,
            description: description.into(),
            confidence,
        }
    }
}

/// What the caller knows about the failure being remediated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueContext {
    pub issue: String,
    pub error: Option<String>,
    pub stack_context: Option<String>,
    pub affected_components: Vec<String>,
}

impl IssueContext {
    pub fn new(issue: impl Into<String>) -> Self {
        Self {
            issue: issue.into(),
            ..Self::default()
        }
    }
}

/// Output of a platform compatibility run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub is_compatible: bool,
    /// 0 to 100.
    pub compatibility_score: f64,
    pub critical_issues: Vec<String>,
}

impl Default for CompatibilityReport {
    fn default() -> Self {
        Self {
            is_compatible: true,
            compatibility_score: 100.0,
            critical_issues: Vec::new(),
        }
    }
}

// =============================================================================
// Collaborator traits
// =============================================================================

#[async_trait]
pub trait HypothesisEngine: Send + Sync {
    async fn analyze(&self, context: &IssueContext) -> Result<Vec<Hypothesis>, RemedyError>;
}

#[async_trait]
pub trait CompatibilityProbe: Send + Sync {
    async fn report(&self) -> Result<CompatibilityReport, RemedyError>;
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Current health score in `[0, 100]`.
    async fn health_score(&self) -> Result<f64, RemedyError>;
}

/// Session-scoped audit trail. Failures are logged by the caller and never
/// abort remediation.
#[async_trait]
pub trait EvidenceLog: Send + Sync {
    async fn start_session(
        &self,
        kind: &str,
        purpose: &str,
        context: &Parameters,
    ) -> Result<String, RemedyError>;

    async fn end_session(&self, session_id: &str) -> Result<(), RemedyError>;
}

// =============================================================================
// Fixed-value implementations
// =============================================================================

/// Returns the same hypotheses, compatibility report and health score every
/// time it is asked.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSignals {
    pub hypotheses: Vec<Hypothesis>,
    pub compatibility: CompatibilityReport,
    pub health: f64,
}

impl Default for StaticSignals {
    fn default() -> Self {
        Self {
            hypotheses: Vec::new(),
            compatibility: CompatibilityReport::default(),
            health: 100.0,
        }
    }
}

impl StaticSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_health(mut self, health: f64) -> Self {
        self.health = health;
        self
    }

    pub fn with_hypothesis(mut self, hypothesis: Hypothesis) -> Self {
        self.hypotheses.push(hypothesis);
        self
    }

    /// Add a critical issue; the report becomes incompatible.
    pub fn with_critical_issue(mut self, issue: impl Into<String>) -> Self {
        self.compatibility.is_compatible = false;
        self.compatibility.critical_issues.push(issue.into());
        self
    }
}

#[async_trait]
impl HypothesisEngine for StaticSignals {
    async fn analyze(&self, _context: &IssueContext) -> Result<Vec<Hypothesis>, RemedyError> {
        Ok(self.hypotheses.clone())
    }
}

#[async_trait]
impl CompatibilityProbe for StaticSignals {
    async fn report(&self) -> Result<CompatibilityReport, RemedyError> {
        Ok(self.compatibility.clone())
    }
}

#[async_trait]
impl HealthProbe for StaticSignals {
    async fn health_score(&self) -> Result<f64, RemedyError> {
        Ok(self.health)
    }
}

/// Evidence log that hands out session ids and stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvidenceLog;

#[async_trait]
impl EvidenceLog for NoopEvidenceLog {
    async fn start_session(
        &self,
        _kind: &str,
        _purpose: &str,
        _context: &Parameters,
    ) -> Result<String, RemedyError> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn end_session(&self, _session_id: &str) -> Result<(), RemedyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_display_and_parse() {
        for category in [
            HypothesisCategory::PlatformFactoryMismatch,
            HypothesisCategory::PragmaCommandFailure,
            HypothesisCategory::EncryptedStorageCompatibility,
            HypothesisCategory::CorruptedDatabase,
            HypothesisCategory::MissingDependencies,
            HypothesisCategory::Other,
        ] {
            assert_eq!(category.to_string().parse::<HypothesisCategory>().unwrap(), category);
        }
        assert!("network".parse::<HypothesisCategory>().is_err());
    }

    #[tokio::test]
    async fn test_static_signals() {
        let signals = StaticSignals::new()
            .with_health(42.0)
            .with_hypothesis(Hypothesis::new(
                HypothesisCategory::CorruptedDatabase,
                "file header mismatch",
                0.8,
            ))
            .with_critical_issue("SQLCipher not loaded");

        assert_eq!(signals.health_score().await.unwrap(), 42.0);
        assert_eq!(signals.analyze(&IssueContext::new("x")).await.unwrap().len(), 1);
        let report = signals.report().await.unwrap();
        assert!(!report.is_compatible);
        assert_eq!(report.critical_issues, vec!["SQLCipher not loaded".to_string()]);
    }

    #[tokio::test]
    async fn test_noop_evidence_log_issues_distinct_ids() {
        let log = NoopEvidenceLog;
        let a = log.start_session("remediation", "test", &Parameters::new()).await.unwrap();
        let b = log.start_session("remediation", "test", &Parameters::new()).await.unwrap();
        assert_ne!(a, b);
        assert!(log.end_session(&a).await.is_ok());
    }
}
