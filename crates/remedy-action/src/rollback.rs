//! Compensating records for previously executed actions.
//!
//! A rollback never re-runs the execution function. It records a new result
//! linked to the original, with details chosen by the action's type.

use std::sync::Arc;
use std::time::Instant;

use remedy_core::events::RemediationEvent;
use remedy_core::types::{ActionType, Parameters, RemediationAction, RemediationResult, Timestamp};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::catalog::ActionCatalog;
use crate::error::RemediationError;
use crate::history::HistoryStore;

pub struct RollbackManager {
    catalog: Arc<ActionCatalog>,
    history: Arc<HistoryStore>,
    events: broadcast::Sender<RemediationEvent>,
}

impl RollbackManager {
    pub fn new(
        catalog: Arc<ActionCatalog>,
        history: Arc<HistoryStore>,
        events: broadcast::Sender<RemediationEvent>,
    ) -> Self {
        Self {
            catalog,
            history,
            events,
        }
    }

    /// Record a rollback of `result_id`.
    ///
    /// Fails if the result or its action is unknown, if the action declares
    /// no rollback plan, or if the result is itself a rollback.
    pub fn rollback(&self, result_id: Uuid) -> Result<RemediationResult, RemediationError> {
        let started = Instant::now();
        let original = self
            .history
            .get(&result_id)
            .ok_or(RemediationError::ResultNotFound(result_id))?;
        let action = self.catalog.get(&original.action_id)?;

        let plan = match action.rollback_plan {
            Some(ref plan) if !original.is_rollback() => plan.clone(),
            _ => return Err(RemediationError::RollbackUnavailable(action.id)),
        };

        let mut details = rollback_details(&action, &original);
        details.insert("rollback_plan".to_string(), json!(plan));
        details.insert("original_success".to_string(), json!(original.success));

        let result = RemediationResult::rolled_back(
            &action.id,
            original.id,
            Timestamp::now(),
            started.elapsed().as_millis() as u64,
            details,
        );
        self.history.record(result.clone());

        info!(
            action_id = %action.id,
            original_result_id = %original.id,
            rollback_result_id = %result.id,
            "Remediation rolled back"
        );
        let _ = self.events.send(RemediationEvent::RolledBack {
            action_id: action.id.clone(),
            original_result_id: original.id,
            rollback_result_id: result.id,
            timestamp: Timestamp::now(),
        });

        Ok(result)
    }
}

/// Type-specific rollback details.
fn rollback_details(action: &RemediationAction, original: &RemediationResult) -> Parameters {
    let mut details = Parameters::new();
    match action.action_type {
        ActionType::ConfigurationChange => {
            details.insert("strategy".to_string(), json!("restore_configuration"));
            let reverted: Vec<&String> = original
                .execution_details
                .get("applied_pragmas")
                .and_then(Value::as_object)
                .map(|applied| applied.keys().collect())
                .unwrap_or_else(|| action.parameters.keys().collect());
            details.insert("reverted_settings".to_string(), json!(reverted));
        }
        ActionType::DatabaseOperation => {
            details.insert("strategy".to_string(), json!("restore_backup"));
            let backup = original
                .execution_details
                .get("backup_file")
                .cloned()
                .unwrap_or(Value::Null);
            details.insert("backup_file".to_string(), backup);
        }
        ActionType::PlatformSpecificFix => {
            details.insert("strategy".to_string(), json!("revert_platform_fix"));
            details.insert("restored_defaults".to_string(), json!(true));
        }
        ActionType::DependencyUpdate => {
            details.insert("strategy".to_string(), json!("pin_previous_versions"));
        }
        _ => {
            details.insert("strategy".to_string(), json!("manual"));
        }
    }
    details
}
