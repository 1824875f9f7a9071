//! Single-shot deferred execution, one live timer per action id.
//!
//! Each scheduled action gets its own timer task. The entry map is guarded
//! by a mutex and every entry carries a generation number: when a timer
//! expires it claims its entry under the lock only if the generation still
//! matches, so a replaced or cancelled timer can never fire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use remedy_core::events::RemediationEvent;
use remedy_core::types::{ExecutionMode, Parameters, Timestamp};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::catalog::ActionCatalog;
use crate::confirmation::ConfirmationGate;
use crate::constraints::DenyReason;
use crate::error::RemediationError;
use crate::executor::Executor;
use crate::types::ScheduledRemediation;

struct Entry {
    generation: u64,
    due_at: Timestamp,
    parameters: Parameters,
    timer: JoinHandle<()>,
}

struct Shared {
    entries: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
    closed: AtomicBool,
    catalog: Arc<ActionCatalog>,
    executor: Arc<Executor>,
    confirmations: Arc<ConfirmationGate>,
    events: broadcast::Sender<RemediationEvent>,
}

/// Owns the deferred-execution timers. Dropping it cancels them all.
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(
        catalog: Arc<ActionCatalog>,
        executor: Arc<Executor>,
        confirmations: Arc<ConfirmationGate>,
        events: broadcast::Sender<RemediationEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                catalog,
                executor,
                confirmations,
                events,
            }),
        }
    }

    /// Run `action_id` once after `delay`, replacing any pending timer for
    /// the same action.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(
        &self,
        action_id: &str,
        delay: Duration,
        parameters: Option<Parameters>,
    ) -> Result<ScheduledRemediation, RemediationError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(RemediationError::Disposed);
        }
        let action = self.shared.catalog.get(action_id)?;
        if action.execution_mode == ExecutionMode::Disabled {
            warn!(action_id = %action.id, "Refusing to schedule disabled action");
            return Err(RemediationError::ConstraintViolation {
                action_id: action.id,
                reason: DenyReason::ActionDisabled,
            });
        }
        let runtime = Handle::try_current()
            .map_err(|e| RemediationError::Scheduler(format!("no tokio runtime: {}", e)))?;

        let parameters = parameters.unwrap_or_default();
        let generation = self.shared.next_generation.fetch_add(1, Ordering::SeqCst);
        let due_at = Timestamp::now().plus_secs(i64::try_from(delay.as_secs()).unwrap_or(i64::MAX));

        let weak = Arc::downgrade(&self.shared);
        let timer_action = action.id.clone();
        let replaced = {
            let mut entries = self.shared.entries.lock().unwrap_or_else(PoisonError::into_inner);
            // `shutdown` drains under this lock after setting `closed`.
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(RemediationError::Disposed);
            }
            let timer = runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                fire(weak, timer_action, generation).await;
            });
            let previous = entries.insert(
                action.id.clone(),
                Entry {
                    generation,
                    due_at,
                    parameters: parameters.clone(),
                    timer,
                },
            );
            match previous {
                Some(old) => {
                    old.timer.abort();
                    true
                }
                None => false,
            }
        };

        info!(action_id = %action.id, delay_secs = delay.as_secs(), replaced, "Remediation scheduled");
        let _ = self.shared.events.send(RemediationEvent::RemediationScheduled {
            action_id: action.id.clone(),
            due_at,
            replaced,
            timestamp: Timestamp::now(),
        });

        Ok(ScheduledRemediation {
            action_id: action.id,
            due_at,
            parameters,
        })
    }

    /// Cancel the pending timer for `action_id`. Returns `false` if none was
    /// pending. Executions already in flight are not affected.
    pub fn cancel(&self, action_id: &str) -> bool {
        let removed = self
            .shared
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(action_id);
        match removed {
            Some(entry) => {
                entry.timer.abort();
                info!(action_id = %action_id, "Scheduled remediation cancelled");
                let _ = self.shared.events.send(RemediationEvent::ScheduleCancelled {
                    action_id: action_id.to_string(),
                    timestamp: Timestamp::now(),
                });
                true
            }
            None => false,
        }
    }

    /// Pending entries ordered by due time.
    pub fn pending(&self) -> Vec<ScheduledRemediation> {
        let entries = self.shared.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pending: Vec<ScheduledRemediation> = entries
            .iter()
            .map(|(id, entry)| ScheduledRemediation {
                action_id: id.clone(),
                due_at: entry.due_at,
                parameters: entry.parameters.clone(),
            })
            .collect();
        pending.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.action_id.cmp(&b.action_id)));
        pending
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every timer and refuse further scheduling.
    pub fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let drained: Vec<Entry> = self
            .shared
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in &drained {
            entry.timer.abort();
        }
        if !drained.is_empty() {
            info!(cancelled = drained.len(), "Scheduler shut down");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn fire(shared: Weak<Shared>, action_id: String, generation: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let parameters = {
        let mut entries = shared.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let current = entries
            .get(&action_id)
            .is_some_and(|entry| entry.generation == generation);
        if current {
            entries.remove(&action_id).map(|entry| entry.parameters)
        } else {
            None
        }
    };
    let Some(parameters) = parameters else {
        return;
    };

    let Some(action) = shared.catalog.find(&action_id) else {
        warn!(action_id = %action_id, "Scheduled action no longer in catalog");
        return;
    };

    match action.execution_mode {
        ExecutionMode::Automatic => {
            match shared.executor.execute(&action.id, Some(parameters), false).await {
                Ok(result) => {
                    info!(action_id = %action.id, success = result.success, "Scheduled remediation ran")
                }
                Err(e) => warn!(action_id = %action.id, error = %e, "Scheduled remediation not run"),
            }
        }
        ExecutionMode::SemiAutomatic | ExecutionMode::Manual => {
            shared.confirmations.request(&action.id, &action.title, parameters);
            info!(action_id = %action.id, "Scheduled remediation awaiting confirmation");
            let _ = shared.events.send(RemediationEvent::ConfirmationRequired {
                action_id: action.id.clone(),
                title: action.title.clone(),
                timestamp: Timestamp::now(),
            });
        }
        ExecutionMode::Disabled => {
            warn!(action_id = %action.id, "Scheduled action was disabled before it fired");
        }
    }
}
