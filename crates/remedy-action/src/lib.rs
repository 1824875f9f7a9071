//! Remediation engine.
//!
//! Holds the action catalog, decides whether an action may run, executes
//! actions through pluggable handlers under a concurrency ceiling, defers
//! them with per-action timers, rolls them back, and turns external
//! diagnostic signals into prioritized recommendations.

pub mod catalog;
pub mod confirmation;
pub mod constraints;
pub mod error;
pub mod executor;
pub mod handler;
pub mod history;
pub mod orchestrator;
pub mod recommend;
pub mod rollback;
pub mod scheduler;
pub mod session;
pub mod signals;
pub mod types;

pub use catalog::ActionCatalog;
pub use confirmation::{ConfirmationGate, PendingConfirmation};
pub use constraints::{evaluate, ConstraintState, Decision, DenyReason};
pub use error::{ExecutionError, RemediationError};
pub use executor::{
    ConcurrencyGauge, ExecutionPermit, Executor, InFlight, InFlightClaim, Prerequisites,
};
pub use handler::{HandlerRegistry, RemediationHandler};
pub use history::HistoryStore;
pub use orchestrator::{Collaborators, RemediationOrchestrator};
pub use recommend::{RecommendationAggregator, RecommendationSignals};
pub use rollback::RollbackManager;
pub use scheduler::Scheduler;
pub use session::RemediationSession;
pub use signals::{
    CompatibilityProbe, CompatibilityReport, EvidenceLog, HealthProbe, Hypothesis,
    HypothesisCategory, HypothesisEngine, IssueContext, NoopEvidenceLog, StaticSignals,
};
pub use types::{
    DetailedReport, ExecutionStatistics, ScheduledRemediation, SessionOutcome, SessionState,
};
