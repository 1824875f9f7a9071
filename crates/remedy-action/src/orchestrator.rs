//! Remediation orchestrator.
//!
//! Public entry point that wires the catalog, handler registry, executor,
//! scheduler, confirmation gate, rollback manager, history store and
//! recommendation aggregator together, and drives optional remediation
//! sessions around them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use remedy_core::config::RemediationConfig;
use remedy_core::events::RemediationEvent;
use remedy_core::types::{ExecutionMode, Parameters, RemediationAction, RemediationResult, Timestamp};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::ActionCatalog;
use crate::confirmation::ConfirmationGate;
use crate::error::RemediationError;
use crate::executor::{Executor, Prerequisites};
use crate::handler::HandlerRegistry;
use crate::history::HistoryStore;
use crate::recommend::{RecommendationAggregator, RecommendationSignals};
use crate::rollback::RollbackManager;
use crate::scheduler::Scheduler;
use crate::session::RemediationSession;
use crate::signals::{
    CompatibilityProbe, EvidenceLog, HealthProbe, Hypothesis, HypothesisEngine, IssueContext,
    NoopEvidenceLog, StaticSignals,
};
use crate::types::{DetailedReport, ExecutionStatistics, ScheduledRemediation, SessionOutcome, SessionState};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const DAY_SECS: i64 = 24 * 60 * 60;

/// External services the orchestrator consults.
pub struct Collaborators {
    pub hypotheses: Arc<dyn HypothesisEngine>,
    pub compatibility: Arc<dyn CompatibilityProbe>,
    pub health: Arc<dyn HealthProbe>,
    pub evidence: Arc<dyn EvidenceLog>,
    pub prerequisites: Prerequisites,
}

impl Collaborators {
    /// Use one [`StaticSignals`] for hypotheses, compatibility and health.
    pub fn from_signals(signals: StaticSignals) -> Self {
        let signals = Arc::new(signals);
        Self {
            hypotheses: signals.clone(),
            compatibility: signals.clone(),
            health: signals,
            evidence: Arc::new(NoopEvidenceLog),
            prerequisites: Prerequisites::new(),
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: Prerequisites) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    pub fn with_evidence_log(mut self, evidence: Arc<dyn EvidenceLog>) -> Self {
        self.evidence = evidence;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::from_signals(StaticSignals::default())
    }
}

pub struct RemediationOrchestrator {
    catalog: Arc<ActionCatalog>,
    handlers: Arc<HandlerRegistry>,
    history: Arc<HistoryStore>,
    executor: Arc<Executor>,
    scheduler: Scheduler,
    confirmations: Arc<ConfirmationGate>,
    rollback: RollbackManager,
    aggregator: RecommendationAggregator,
    hypotheses: Arc<dyn HypothesisEngine>,
    compatibility: Arc<dyn CompatibilityProbe>,
    health: Arc<dyn HealthProbe>,
    evidence: Arc<dyn EvidenceLog>,
    report_history_limit: usize,
    events: broadcast::Sender<RemediationEvent>,
    last_hypotheses: RwLock<Vec<Hypothesis>>,
    session: RwLock<Option<Arc<RemediationSession>>>,
    disposed: AtomicBool,
}

impl RemediationOrchestrator {
    /// Orchestrator over the built-in catalog and handlers with an
    /// in-memory history.
    pub fn new(config: RemediationConfig, collaborators: Collaborators) -> Self {
        Self::with_parts(
            config,
            Arc::new(ActionCatalog::with_builtin()),
            Arc::new(HandlerRegistry::with_defaults()),
            Arc::new(HistoryStore::new()),
            collaborators,
        )
    }

    /// Orchestrator over caller-supplied stores.
    pub fn with_parts(
        config: RemediationConfig,
        catalog: Arc<ActionCatalog>,
        handlers: Arc<HandlerRegistry>,
        history: Arc<HistoryStore>,
        collaborators: Collaborators,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let confirmations = Arc::new(ConfirmationGate::new());
        let executor = Arc::new(Executor::new(
            Arc::clone(&catalog),
            Arc::clone(&handlers),
            Arc::clone(&history),
            collaborators.prerequisites,
            config.clone(),
            events.clone(),
        ));
        let scheduler = Scheduler::new(
            Arc::clone(&catalog),
            Arc::clone(&executor),
            Arc::clone(&confirmations),
            events.clone(),
        );
        let rollback = RollbackManager::new(Arc::clone(&catalog), Arc::clone(&history), events.clone());
        let aggregator = RecommendationAggregator::new(Arc::clone(&catalog), config.failure_rate_threshold);

        Self {
            catalog,
            handlers,
            history,
            executor,
            scheduler,
            confirmations,
            rollback,
            aggregator,
            hypotheses: collaborators.hypotheses,
            compatibility: collaborators.compatibility,
            health: collaborators.health,
            evidence: collaborators.evidence,
            report_history_limit: config.report_history_limit,
            events,
            last_hypotheses: RwLock::new(Vec::new()),
            session: RwLock::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn catalog(&self) -> &Arc<ActionCatalog> {
        &self.catalog
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RemediationEvent> {
        self.events.subscribe()
    }

    pub fn set_automatic_execution(&self, allowed: bool) {
        self.executor.set_automatic_execution(allowed);
    }

    pub fn active_executions(&self) -> usize {
        self.executor.active_executions()
    }

    // =========================================================================
    // Recommendations
    // =========================================================================

    /// Analyze an issue and return the ranked actions that address it.
    ///
    /// The hypotheses produced here are kept and reused by
    /// [`get_recommendations`](Self::get_recommendations).
    pub async fn generate_remediations(
        &self,
        issue: &str,
        error: Option<&str>,
        stack_context: Option<&str>,
        affected_components: &[String],
    ) -> Result<Vec<RemediationAction>, RemediationError> {
        self.ensure_active()?;
        let context = IssueContext {
            issue: issue.to_string(),
            error: error.map(str::to_string),
            stack_context: stack_context.map(str::to_string),
            affected_components: affected_components.to_vec(),
        };
        self.analyze(&context).await
    }

    /// Ranked actions for the current health, compatibility and failure
    /// picture plus the hypotheses of the last analyzed issue.
    pub async fn get_recommendations(&self) -> Result<Vec<RemediationAction>, RemediationError> {
        self.ensure_active()?;
        let hypotheses = self
            .last_hypotheses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(self.recommend(hypotheses).await)
    }

    async fn analyze(&self, context: &IssueContext) -> Result<Vec<RemediationAction>, RemediationError> {
        let hypotheses = match self.hypotheses.analyze(context).await {
            Ok(hypotheses) => hypotheses,
            Err(e) => {
                warn!(error = %e, "Hypothesis engine failed; continuing without hypotheses");
                Vec::new()
            }
        };
        *self
            .last_hypotheses
            .write()
            .unwrap_or_else(PoisonError::into_inner) = hypotheses.clone();

        let recommended = self.recommend(hypotheses).await;
        info!(
            issue = %context.issue,
            recommended = recommended.len(),
            "Remediations generated"
        );
        Ok(recommended)
    }

    async fn recommend(&self, hypotheses: Vec<Hypothesis>) -> Vec<RemediationAction> {
        let health_score = match self.health.health_score().await {
            Ok(score) => Some(score),
            Err(e) => {
                warn!(error = %e, "Health probe failed");
                None
            }
        };
        let compatibility = match self.compatibility.report().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Compatibility probe failed");
                None
            }
        };
        let recent_failures = self
            .history
            .failures_since(Timestamp::now().minus_secs(DAY_SECS));

        self.aggregator.aggregate(&RecommendationSignals {
            health_score,
            recent_failures,
            compatibility,
            hypotheses,
        })
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Run an action now. See [`Executor::execute`].
    pub async fn execute_remediation(
        &self,
        action_id: &str,
        force: bool,
        overrides: Option<Parameters>,
    ) -> Result<RemediationResult, RemediationError> {
        self.ensure_active()?;
        self.executor.execute(action_id, overrides, force).await
    }

    /// Run an action once after `delay`, replacing any pending timer for it.
    pub fn schedule_remediation(
        &self,
        action_id: &str,
        delay: Duration,
        parameters: Option<Parameters>,
    ) -> Result<ScheduledRemediation, RemediationError> {
        self.ensure_active()?;
        self.scheduler.schedule(action_id, delay, parameters)
    }

    /// Returns `false` if nothing was scheduled for `action_id`.
    pub fn cancel_scheduled_remediation(&self, action_id: &str) -> bool {
        self.scheduler.cancel(action_id)
    }

    pub fn scheduled_remediations(&self) -> Vec<ScheduledRemediation> {
        self.scheduler.pending()
    }

    /// Execute an action parked by its timer. Constraints still apply.
    pub async fn confirm_remediation(
        &self,
        action_id: &str,
    ) -> Result<RemediationResult, RemediationError> {
        self.ensure_active()?;
        let pending = self
            .confirmations
            .approve(action_id)
            .ok_or_else(|| RemediationError::NoPendingConfirmation(action_id.to_string()))?;
        info!(action_id = %action_id, "Remediation confirmed");
        self.executor
            .execute(&pending.action_id, Some(pending.parameters), false)
            .await
    }

    pub fn dismiss_confirmation(&self, action_id: &str) -> bool {
        let dismissed = self.confirmations.dismiss(action_id);
        if dismissed {
            info!(action_id = %action_id, "Remediation confirmation dismissed");
        }
        dismissed
    }

    pub fn pending_confirmations(&self) -> Vec<String> {
        self.confirmations
            .pending()
            .into_iter()
            .map(|p| p.action_id)
            .collect()
    }

    pub fn rollback_remediation(&self, result_id: Uuid) -> Result<RemediationResult, RemediationError> {
        self.ensure_active()?;
        self.rollback.rollback(result_id)
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    pub fn get_execution_statistics(&self) -> ExecutionStatistics {
        let mut stats = self.history.statistics(&self.catalog, Timestamp::now());
        stats.active_executions = self.executor.active_executions();
        stats.scheduled_remediations = self.scheduler.len();
        stats.pending_confirmations = self.confirmations.pending_count();
        stats
    }

    pub fn session_state(&self) -> SessionState {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(SessionState::Inactive)
    }

    pub async fn get_detailed_report(&self) -> Result<DetailedReport, RemediationError> {
        let recommendations = self.get_recommendations().await?;
        Ok(DetailedReport {
            generated_at: Timestamp::now(),
            session_state: self.session_state(),
            config: self.executor.config(),
            statistics: self.get_execution_statistics(),
            catalog: self.catalog.list(),
            scheduled: self.scheduler.pending(),
            pending_confirmations: self.pending_confirmations(),
            recommendations,
            recent_history: self.history.recent(self.report_history_limit),
        })
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Analyze an issue, run the recommended automatic actions, and report.
    ///
    /// Semi-automatic recommendations are queued for confirmation; manual
    /// ones and denied executions are listed as skipped. The run is
    /// bracketed by an evidence session whose failures are only logged.
    pub async fn run_session(&self, issue: IssueContext) -> Result<SessionOutcome, RemediationError> {
        self.ensure_active()?;
        let session = Arc::new(RemediationSession::new(self.events.clone()));
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&session));

        let mut evidence_context = Parameters::new();
        evidence_context.insert("session_id".to_string(), json!(session.id().to_string()));
        evidence_context.insert("issue".to_string(), json!(issue.issue));
        let evidence_session_id = match self
            .evidence
            .start_session("remediation", &issue.issue, &evidence_context)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "Evidence session could not be started");
                None
            }
        };

        let outcome = self.drive_session(&session, &issue).await;
        if let Err(ref e) = outcome {
            session.fail(&e.to_string());
        }

        if let Some(ref id) = evidence_session_id {
            if let Err(e) = self.evidence.end_session(id).await {
                warn!(evidence_session_id = %id, error = %e, "Evidence session could not be ended");
            }
        }

        let (recommended, results, skipped) = outcome?;
        Ok(SessionOutcome {
            evidence_session_id,
            final_state: session.state(),
            recommended,
            results,
            skipped,
            statistics: self.get_execution_statistics(),
        })
    }

    #[allow(clippy::type_complexity)]
    async fn drive_session(
        &self,
        session: &RemediationSession,
        issue: &IssueContext,
    ) -> Result<(Vec<String>, Vec<RemediationResult>, Vec<(String, String)>), RemediationError> {
        session.transition(SessionState::Initializing)?;
        session.transition(SessionState::Analyzing)?;
        let recommended = self.analyze(issue).await?;

        session.transition(SessionState::Remediating)?;
        let mut results = Vec::new();
        let mut skipped = Vec::new();
        for action in &recommended {
            match action.execution_mode {
                ExecutionMode::Automatic => {
                    match self.executor.execute(&action.id, None, false).await {
                        Ok(result) => results.push(result),
                        Err(e @ RemediationError::ConfigurationFault(_)) => return Err(e),
                        Err(e) => skipped.push((action.id.clone(), e.to_string())),
                    }
                }
                ExecutionMode::SemiAutomatic if self.catalog.find(&action.id).is_some() => {
                    self.confirmations
                        .request(&action.id, &action.title, Parameters::new());
                    let _ = self.events.send(RemediationEvent::ConfirmationRequired {
                        action_id: action.id.clone(),
                        title: action.title.clone(),
                        timestamp: Timestamp::now(),
                    });
                    skipped.push((action.id.clone(), "awaiting confirmation".to_string()));
                }
                mode => {
                    skipped.push((action.id.clone(), format!("{} action not run unattended", mode)));
                }
            }
        }

        session.transition(SessionState::Monitoring)?;
        let stats = self.get_execution_statistics();
        info!(
            executed = results.len(),
            skipped = skipped.len(),
            active = stats.active_executions,
            "Remediation session monitored"
        );
        session.transition(SessionState::Completed)?;

        let recommended = recommended.into_iter().map(|a| a.id).collect();
        Ok((recommended, results, skipped))
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Cancel every pending timer and confirmation and refuse further work.
    /// Executions already in flight finish normally.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scheduler.shutdown();
        self.confirmations.clear();
        info!("Remediation orchestrator disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<(), RemediationError> {
        if self.is_disposed() {
            Err(RemediationError::Disposed)
        } else {
            Ok(())
        }
    }
}
