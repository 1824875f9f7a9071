//! Execution function registry and trait definition.
//!
//! Catalog entries are declarative; the code that carries out an action is a
//! [`RemediationHandler`] bound to the action id in a [`HandlerRegistry`].
//! The built-in handlers stage their change and report what they would
//! apply; platform-specific fixes are supplied by the embedding application.

pub mod dependency;
pub mod factory;
pub mod storage;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use remedy_core::types::Parameters;

use crate::catalog;
use crate::error::ExecutionError;

/// Executes one remediation action.
///
/// `run` receives the merged parameters (catalog defaults overlaid with
/// per-invocation overrides) and returns the execution details recorded on
/// the result. Errors are captured into a failed result, never propagated.
#[async_trait]
pub trait RemediationHandler: Send + Sync {
    async fn run(&self, params: &Parameters) -> Result<Parameters, ExecutionError>;

    /// Human-readable summary of what `run` would do with these parameters.
    fn describe(&self, params: &Parameters) -> String;
}

/// Action id to execution function binding.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn RemediationHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every built-in catalog action.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_defaults();
        registry
    }

    pub fn register_defaults(&self) {
        self.register(catalog::SQLITE_FALLBACK, Arc::new(storage::SqliteFallbackHandler));
        self.register(
            catalog::RESET_DATABASE_FACTORY,
            Arc::new(factory::ResetFactoryHandler::new()),
        );
        self.register(catalog::OPTIMIZE_PRAGMAS, Arc::new(storage::OptimizePragmasHandler));
        self.register(catalog::RECREATE_DATABASE, Arc::new(storage::RecreateDatabaseHandler));
        self.register(
            catalog::DEPENDENCY_CHECK,
            Arc::new(dependency::DependencyCheckHandler::default()),
        );
    }

    /// Bind a handler to an action id, replacing any previous binding.
    pub fn register(&self, action_id: impl Into<String>, handler: Arc<dyn RemediationHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(action_id.into(), handler);
    }

    pub fn get(&self, action_id: &str) -> Option<Arc<dyn RemediationHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(action_id)
            .cloned()
    }

    pub fn contains(&self, action_id: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(action_id)
    }

    pub fn unregister(&self, action_id: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(action_id)
            .is_some()
    }
}

/// Read a required string parameter.
pub(crate) fn required_str<'a>(params: &'a Parameters, key: &str) -> Result<&'a str, ExecutionError> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(ExecutionError::InvalidParameters(format!(
            "'{}' must not be empty",
            key
        ))),
        None => Err(ExecutionError::InvalidParameters(format!(
            "missing string parameter '{}'",
            key
        ))),
    }
}

/// Read an optional boolean parameter.
pub(crate) fn flag(params: &Parameters, key: &str, default: bool) -> Result<bool, ExecutionError> {
    match params.get(key) {
        None => Ok(default),
        Some(value) => value.as_bool().ok_or_else(|| {
            ExecutionError::InvalidParameters(format!("'{}' must be a boolean", key))
        }),
    }
}
