//! Registry of known remediation actions.
//!
//! The catalog is keyed by action id with last-write-wins upserts. It holds
//! declarative definitions only; execution functions live in the
//! [`HandlerRegistry`](crate::handler::HandlerRegistry).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use remedy_core::error::RemedyError;
use remedy_core::types::{ActionType, ExecutionMode, RemediationAction, Urgency};
use serde_json::json;
use tracing::debug;

use crate::error::RemediationError;

pub const SQLITE_FALLBACK: &str = "sqlite_fallback";
pub const RESET_DATABASE_FACTORY: &str = "reset_database_factory";
pub const OPTIMIZE_PRAGMAS: &str = "optimize_pragmas";
pub const RECREATE_DATABASE: &str = "recreate_database";
pub const DEPENDENCY_CHECK: &str = "dependency_check";

/// In-memory action registry shared between the executor, scheduler,
/// rollback manager, and recommendation aggregator.
pub struct ActionCatalog {
    actions: RwLock<HashMap<String, RemediationAction>>,
}

impl ActionCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            actions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a catalog seeded with [`builtin_actions`].
    pub fn with_builtin() -> Self {
        let catalog = Self::new();
        for action in builtin_actions() {
            // Built-in definitions are statically valid.
            let _ = catalog.register(action);
        }
        catalog
    }

    /// Insert or replace an action. Returns the definition it replaced.
    pub fn register(
        &self,
        action: RemediationAction,
    ) -> Result<Option<RemediationAction>, RemedyError> {
        action.validate()?;
        let mut actions = self.actions.write().unwrap_or_else(PoisonError::into_inner);
        let previous = actions.insert(action.id.clone(), action);
        if let Some(ref prev) = previous {
            debug!(action_id = %prev.id, "Catalog entry replaced");
        }
        Ok(previous)
    }

    /// Look up an action by id.
    pub fn get(&self, id: &str) -> Result<RemediationAction, RemediationError> {
        self.find(id)
            .ok_or_else(|| RemediationError::ActionNotFound(id.to_string()))
    }

    pub fn find(&self, id: &str) -> Option<RemediationAction> {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &str) -> Option<RemediationAction> {
        self.actions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// All actions, ordered by id.
    pub fn list(&self) -> Vec<RemediationAction> {
        let mut actions: Vec<RemediationAction> = self
            .actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        actions.sort_by(|a, b| a.id.cmp(&b.id));
        actions
    }

    pub fn len(&self) -> usize {
        self.actions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed set of actions every process starts with.
pub fn builtin_actions() -> Vec<RemediationAction> {
    let mut sqlite_fallback = RemediationAction::new(
        SQLITE_FALLBACK,
        "Switch to unencrypted storage",
        ActionType::PlatformSpecificFix,
        Urgency::High,
        ExecutionMode::SemiAutomatic,
        0.95,
    )
    .with_description(
        "Open the database without SQLCipher when the platform cannot load the encrypted driver",
    )
    .with_target_issue("encrypted storage compatibility")
    .with_prerequisites(&["database_backup_available"])
    .with_parameter("preserve_data", json!(true))
    .with_parameter("encryption_enabled", json!(false))
    .with_rollback_plan("Re-enable encrypted storage once the SQLCipher driver loads again");
    sqlite_fallback.estimated_time_secs = 30;
    sqlite_fallback.steps = vec![
        "Back up the current database file".to_string(),
        "Reopen the database with the plain SQLite driver".to_string(),
        "Verify read/write access".to_string(),
    ];
    sqlite_fallback.risks = vec!["Data at rest is no longer encrypted".to_string()];
    sqlite_fallback.benefits = vec!["Restores database access immediately".to_string()];

    let mut reset_factory = RemediationAction::new(
        RESET_DATABASE_FACTORY,
        "Reset platform database factory",
        ActionType::PlatformSpecificFix,
        Urgency::Critical,
        ExecutionMode::Automatic,
        0.90,
    )
    .with_description("Reinitialize the database factory for the running platform")
    .with_target_issue("platform factory mismatch")
    .with_parameter("factory", json!("ffi"))
    .with_rollback_plan("Restore the previously configured database factory");
    reset_factory.estimated_time_secs = 10;
    reset_factory.steps = vec![
        "Detect the running platform".to_string(),
        "Select the matching database factory".to_string(),
        "Reinitialize the factory before the next open".to_string(),
    ];
    reset_factory.risks = vec!["Open connections must be re-established".to_string()];
    reset_factory.benefits = vec!["Fixes factory/platform mismatches".to_string()];

    let mut optimize_pragmas = RemediationAction::new(
        OPTIMIZE_PRAGMAS,
        "Optimize storage configuration pragmas",
        ActionType::ConfigurationChange,
        Urgency::Normal,
        ExecutionMode::Automatic,
        0.85,
    )
    .with_description("Apply a conservative PRAGMA set that every supported platform accepts")
    .with_target_issue("pragma command failure")
    .with_parameter(
        "pragmas",
        json!({"journal_mode": "WAL", "synchronous": "NORMAL", "foreign_keys": "ON"}),
    )
    .with_rollback_plan("Restore the default PRAGMA values");
    optimize_pragmas.estimated_time_secs = 5;
    optimize_pragmas.steps = vec![
        "Skip PRAGMAs unsupported by the current driver".to_string(),
        "Apply the configured PRAGMA values".to_string(),
    ];
    optimize_pragmas.benefits = vec!["Avoids PRAGMA failures on restricted drivers".to_string()];

    let mut recreate = RemediationAction::new(
        RECREATE_DATABASE,
        "Recreate corrupted database",
        ActionType::DatabaseOperation,
        Urgency::Emergency,
        ExecutionMode::Manual,
        0.70,
    )
    .with_description("Move the corrupted file aside and create a fresh database")
    .with_target_issue("corrupted database")
    .with_prerequisites(&["database_backup_available", "user_data_export_confirmed"])
    .with_parameter("database_name", json!("app.db"))
    .with_parameter("backup_first", json!(true))
    .with_rollback_plan("Restore the database file from the pre-recreation backup");
    recreate.estimated_time_secs = 120;
    recreate.steps = vec![
        "Copy the corrupted file to a backup location".to_string(),
        "Delete the corrupted file".to_string(),
        "Create a new database and run migrations".to_string(),
    ];
    recreate.risks = vec!["Unsynchronized local data is lost".to_string()];
    recreate.benefits = vec!["Recovers from unrecoverable corruption".to_string()];

    let mut dependency_check = RemediationAction::new(
        DEPENDENCY_CHECK,
        "Check dependencies",
        ActionType::Monitoring,
        Urgency::Low,
        ExecutionMode::Automatic,
        0.99,
    )
    .with_description("Verify that every native storage dependency is available")
    .with_target_issue("missing dependencies")
    .with_parameter(
        "required_dependencies",
        json!(["sqlite3", "sqflite_common_ffi", "path_provider"]),
    );
    dependency_check.estimated_time_secs = 2;
    dependency_check.steps = vec!["Probe each required dependency".to_string()];
    dependency_check.benefits = vec!["Read-only diagnosis".to_string()];

    vec![
        sqlite_fallback,
        reset_factory,
        optimize_pragmas,
        recreate,
        dependency_check,
    ]
}
