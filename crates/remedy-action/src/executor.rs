//! Runs catalog actions under the constraint evaluator and the concurrency
//! ceiling, capturing every outcome as a [`RemediationResult`].
//!
//! Each admitted run is a spawned task holding an [`ExecutionPermit`] and an
//! [`InFlightClaim`]. That task records the result and emits the event, so
//! the run is recorded once even when the caller stops waiting, and the
//! gauge drops back even if the handler panics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use remedy_core::config::RemediationConfig;
use remedy_core::events::RemediationEvent;
use remedy_core::types::{ExecutionMode, Parameters, RemediationAction, RemediationResult, Timestamp};
use tokio::sync::broadcast;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::catalog::ActionCatalog;
use crate::constraints::{evaluate, ConstraintState, DenyReason};
use crate::error::{ExecutionError, RemediationError};
use crate::handler::{HandlerRegistry, RemediationHandler};
use crate::history::HistoryStore;

// =============================================================================
// Concurrency gauge
// =============================================================================

/// Number of actions currently executing.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGauge {
    active: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Reserve a slot if fewer than `max` are in use.
    pub fn try_acquire(&self, max: usize) -> Option<ExecutionPermit> {
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if current >= max {
                return None;
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    return Some(ExecutionPermit {
                        active: Arc::clone(&self.active),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Reserve a slot regardless of the ceiling. Used by forced executions.
    pub fn acquire(&self) -> ExecutionPermit {
        self.active.fetch_add(1, Ordering::SeqCst);
        ExecutionPermit {
            active: Arc::clone(&self.active),
        }
    }
}

/// One reserved execution slot, released on drop.
#[derive(Debug)]
pub struct ExecutionPermit {
    active: Arc<AtomicUsize>,
}

impl Drop for ExecutionPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// In-flight tracking
// =============================================================================

/// Per-action count of runs that have not recorded their result yet.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    running: Arc<Mutex<HashMap<String, usize>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, action_id: &str) -> bool {
        self.lock().contains_key(action_id)
    }

    /// Claim `action_id` only if no other run holds it.
    pub fn try_claim(&self, action_id: &str) -> Option<InFlightClaim> {
        let mut running = self.lock();
        if running.contains_key(action_id) {
            return None;
        }
        running.insert(action_id.to_string(), 1);
        Some(self.claim_handle(action_id))
    }

    /// Claim `action_id` alongside any runs already holding it.
    pub fn claim(&self, action_id: &str) -> InFlightClaim {
        *self.lock().entry(action_id.to_string()).or_insert(0) += 1;
        self.claim_handle(action_id)
    }

    fn claim_handle(&self, action_id: &str) -> InFlightClaim {
        InFlightClaim {
            running: Arc::clone(&self.running),
            action_id: action_id.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks one run of an action as in flight until dropped.
#[derive(Debug)]
pub struct InFlightClaim {
    running: Arc<Mutex<HashMap<String, usize>>>,
    action_id: String,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = running.get_mut(&self.action_id) {
            *count -= 1;
            if *count == 0 {
                running.remove(&self.action_id);
            }
        }
    }
}

// =============================================================================
// Prerequisites
// =============================================================================

type PrerequisiteCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Named advisory checks. Unknown or unmet prerequisites become warnings on
/// the result and never block execution.
#[derive(Clone, Default)]
pub struct Prerequisites {
    checks: HashMap<String, PrerequisiteCheck>,
}

impl Prerequisites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check<F>(mut self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.checks.insert(name.into(), Arc::new(check));
        self
    }

    /// Evaluate `names` in order and return one warning per problem.
    pub fn warnings_for(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| match self.checks.get(name) {
                None => Some(format!("Prerequisite '{}' is not recognized", name)),
                Some(check) if !check() => Some(format!("Prerequisite '{}' is not met", name)),
                Some(_) => None,
            })
            .collect()
    }
}

impl std::fmt::Debug for Prerequisites {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.checks.keys().collect();
        names.sort();
        f.debug_struct("Prerequisites").field("checks", &names).finish()
    }
}

// =============================================================================
// Executor
// =============================================================================

pub struct Executor {
    catalog: Arc<ActionCatalog>,
    handlers: Arc<HandlerRegistry>,
    history: Arc<HistoryStore>,
    prerequisites: Prerequisites,
    config: RemediationConfig,
    allow_automatic: AtomicBool,
    gauge: ConcurrencyGauge,
    in_flight: InFlight,
    events: broadcast::Sender<RemediationEvent>,
}

impl Executor {
    pub fn new(
        catalog: Arc<ActionCatalog>,
        handlers: Arc<HandlerRegistry>,
        history: Arc<HistoryStore>,
        prerequisites: Prerequisites,
        config: RemediationConfig,
        events: broadcast::Sender<RemediationEvent>,
    ) -> Self {
        Self {
            catalog,
            handlers,
            history,
            prerequisites,
            allow_automatic: AtomicBool::new(config.allow_automatic_execution),
            config,
            gauge: ConcurrencyGauge::new(),
            in_flight: InFlight::new(),
            events,
        }
    }

    pub fn active_executions(&self) -> usize {
        self.gauge.active()
    }

    pub fn gauge(&self) -> &ConcurrencyGauge {
        &self.gauge
    }

    pub fn automatic_execution_allowed(&self) -> bool {
        self.allow_automatic.load(Ordering::SeqCst)
    }

    pub fn set_automatic_execution(&self, allowed: bool) {
        self.allow_automatic.store(allowed, Ordering::SeqCst);
        info!(allowed, "Automatic execution toggled");
    }

    /// Limits in effect, with the live automatic-execution flag.
    pub fn config(&self) -> RemediationConfig {
        RemediationConfig {
            allow_automatic_execution: self.automatic_execution_allowed(),
            ..self.config.clone()
        }
    }

    /// Snapshot of everything [`evaluate`] needs for `action`.
    pub fn constraint_state(&self, action: &RemediationAction, now: Timestamp) -> ConstraintState {
        ConstraintState {
            allow_automatic_execution: self.automatic_execution_allowed(),
            active_executions: self.gauge.active(),
            max_concurrent_actions: self.config.max_concurrent_actions,
            min_success_rate: self.config.min_success_rate,
            cooldown_secs: self.config.cooldown_secs,
            last_executed_at: self.history.last_execution_of(&action.id),
            in_flight: self.in_flight.is_running(&action.id),
            now,
        }
    }

    /// Run an action once and record its result.
    ///
    /// `force` skips the evaluator but not the catalog lookup, the
    /// `disabled` mode check, or the handler lookup. Once admitted, the run
    /// is recorded and announced by its own task, even if the caller stops
    /// waiting for it.
    pub async fn execute(
        &self,
        action_id: &str,
        overrides: Option<Parameters>,
        force: bool,
    ) -> Result<RemediationResult, RemediationError> {
        let action = self.catalog.get(action_id)?;

        if action.execution_mode == ExecutionMode::Disabled {
            return Err(self.deny(&action, DenyReason::ActionDisabled));
        }

        if !force {
            let decision = evaluate(&action, &self.constraint_state(&action, Timestamp::now()));
            debug!(action_id = %action.id, allowed = decision.allowed, reason = ?decision.reason, "Constraint decision");
            if let Some(reason) = decision.reason {
                return Err(self.deny(&action, reason));
            }
        }

        let handler = self
            .handlers
            .get(&action.id)
            .ok_or_else(|| RemediationError::ConfigurationFault(action.id.clone()))?;

        let permit = if force {
            self.gauge.acquire()
        } else {
            match self.gauge.try_acquire(self.config.max_concurrent_actions) {
                Some(permit) => permit,
                None => return Err(self.deny(&action, DenyReason::MaxConcurrentReached)),
            }
        };
        // Another run may have been admitted since the snapshot above.
        let claim = if force || self.config.cooldown_secs == 0 {
            self.in_flight.claim(&action.id)
        } else {
            match self.in_flight.try_claim(&action.id) {
                Some(claim) => claim,
                None => return Err(self.deny(&action, DenyReason::InCooldown)),
            }
        };

        let params = merge_parameters(&action.parameters, overrides);
        let warnings = self.prerequisites.warnings_for(&action.prerequisites);
        for warning in &warnings {
            warn!(action_id = %action.id, "{}", warning);
        }

        info!(action_id = %action.id, forced = force, "Executing remediation");
        let run = RecordedRun {
            action_id: action.id.clone(),
            warnings,
            history: Arc::clone(&self.history),
            events: self.events.clone(),
        };
        let task = tokio::spawn(async move {
            let _permit = permit;
            let _claim = claim;
            run.execute(handler, params).await
        });
        task.await.map_err(|e| RemediationError::ExecutionAborted {
            action_id: action.id.clone(),
            reason: e.to_string(),
        })
    }

    fn deny(&self, action: &RemediationAction, reason: DenyReason) -> RemediationError {
        warn!(action_id = %action.id, reason = %reason, "Remediation denied");
        let _ = self.events.send(RemediationEvent::ExecutionDenied {
            action_id: action.id.clone(),
            reason: reason.to_string(),
            timestamp: Timestamp::now(),
        });
        RemediationError::ConstraintViolation {
            action_id: action.id.clone(),
            reason,
        }
    }
}

/// What an admitted run needs to record its own outcome.
struct RecordedRun {
    action_id: String,
    warnings: Vec<String>,
    history: Arc<HistoryStore>,
    events: broadcast::Sender<RemediationEvent>,
}

impl RecordedRun {
    async fn execute(self, handler: Arc<dyn RemediationHandler>, params: Parameters) -> RemediationResult {
        let executed_at = Timestamp::now();
        let started = Instant::now();

        let outcome = match tokio::spawn(async move { handler.run(&params).await }).await {
            Ok(outcome) => outcome,
            Err(e) => Err(panic_to_error(e)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(details) => {
                RemediationResult::succeeded(&self.action_id, executed_at, elapsed_ms, details, self.warnings)
            }
            Err(e) => RemediationResult::failed(
                &self.action_id,
                executed_at,
                elapsed_ms,
                e.to_string(),
                Parameters::new(),
                self.warnings,
            ),
        };
        self.history.record(result.clone());

        let event = if result.success {
            info!(action_id = %self.action_id, result_id = %result.id, duration_ms = elapsed_ms, "Remediation succeeded");
            RemediationEvent::ActionExecuted {
                action_id: self.action_id.clone(),
                result_id: result.id,
                duration_ms: elapsed_ms,
                timestamp: Timestamp::now(),
            }
        } else {
            let error = result.error_message.clone().unwrap_or_default();
            warn!(action_id = %self.action_id, result_id = %result.id, error = %error, "Remediation failed");
            RemediationEvent::ActionFailed {
                action_id: self.action_id.clone(),
                result_id: result.id,
                error,
                timestamp: Timestamp::now(),
            }
        };
        let _ = self.events.send(event);

        result
    }
}

/// Catalog defaults overlaid with per-invocation overrides.
pub fn merge_parameters(defaults: &Parameters, overrides: Option<Parameters>) -> Parameters {
    let mut merged = defaults.clone();
    if let Some(overrides) = overrides {
        merged.extend(overrides);
    }
    merged
}

fn panic_to_error(err: JoinError) -> ExecutionError {
    if err.is_cancelled() {
        return ExecutionError::Panicked("execution task cancelled".to_string());
    }
    let payload = err.into_panic();
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    ExecutionError::Panicked(message)
}
