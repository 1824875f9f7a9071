//! Storage-level handlers: encrypted fallback, PRAGMA tuning, recreation.
//!
//! These stage the change and report it in the execution details. They do
//! not touch database files themselves.

use async_trait::async_trait;
use remedy_core::types::Parameters;
use serde_json::{json, Value};

use crate::error::ExecutionError;
use crate::handler::{flag, required_str, RemediationHandler};

/// PRAGMAs that must never be changed by an automated fix.
const FORBIDDEN_PRAGMAS: &[&str] = &["key", "rekey", "writable_schema"];

/// Switches storage to the unencrypted driver.
pub struct SqliteFallbackHandler;

#[async_trait]
impl RemediationHandler for SqliteFallbackHandler {
    async fn run(&self, params: &Parameters) -> Result<Parameters, ExecutionError> {
        let preserve_data = flag(params, "preserve_data", true)?;
        tracing::info!(preserve_data, "Unencrypted storage fallback staged");

        let mut details = Parameters::new();
        details.insert("encryption_enabled".to_string(), json!(false));
        details.insert("preserve_data".to_string(), json!(preserve_data));
        details.insert("staged".to_string(), json!(true));
        Ok(details)
    }

    fn describe(&self, params: &Parameters) -> String {
        let preserve = params
            .get("preserve_data")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if preserve {
            "Reopen storage without encryption, keeping existing data".to_string()
        } else {
            "Reopen storage without encryption on a fresh file".to_string()
        }
    }
}

/// Applies a PRAGMA set.
pub struct OptimizePragmasHandler;

#[async_trait]
impl RemediationHandler for OptimizePragmasHandler {
    async fn run(&self, params: &Parameters) -> Result<Parameters, ExecutionError> {
        let pragmas = params
            .get("pragmas")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ExecutionError::InvalidParameters("'pragmas' must be an object".to_string())
            })?;

        let mut applied = Parameters::new();
        let mut skipped = Vec::new();
        for (name, value) in pragmas {
            let lowered = name.to_ascii_lowercase();
            if FORBIDDEN_PRAGMAS.contains(&lowered.as_str()) {
                skipped.push(json!(name));
                continue;
            }
            match value {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                    applied.insert(lowered, value.clone());
                }
                _ => {
                    return Err(ExecutionError::InvalidParameters(format!(
                        "PRAGMA '{}' needs a scalar value",
                        name
                    )))
                }
            }
        }

        if applied.is_empty() {
            return Err(ExecutionError::HandlerFailed(
                "no applicable PRAGMA in parameters".to_string(),
            ));
        }

        tracing::info!(count = applied.len(), "PRAGMA set staged");
        let mut details = Parameters::new();
        details.insert("applied_pragmas".to_string(), Value::Object(applied));
        details.insert("skipped_pragmas".to_string(), Value::Array(skipped));
        Ok(details)
    }

    fn describe(&self, params: &Parameters) -> String {
        let names: Vec<&str> = params
            .get("pragmas")
            .and_then(Value::as_object)
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default();
        if names.is_empty() {
            "Apply PRAGMAs: <none>".to_string()
        } else {
            format!("Apply PRAGMAs: {}", names.join(", "))
        }
    }
}

/// Moves a corrupted database aside and creates a new one.
pub struct RecreateDatabaseHandler;

#[async_trait]
impl RemediationHandler for RecreateDatabaseHandler {
    async fn run(&self, params: &Parameters) -> Result<Parameters, ExecutionError> {
        let name = required_str(params, "database_name")?;
        if name.contains('/') || name.contains('\\') {
            return Err(ExecutionError::InvalidParameters(format!(
                "database_name must be a bare file name, got '{}'",
                name
            )));
        }
        let backup_first = flag(params, "backup_first", true)?;
        tracing::info!(database = %name, backup_first, "Database recreation staged");

        let mut details = Parameters::new();
        details.insert("database_name".to_string(), json!(name));
        details.insert("backup_first".to_string(), json!(backup_first));
        if backup_first {
            details.insert("backup_file".to_string(), json!(format!("{}.bak", name)));
        }
        details.insert("staged".to_string(), json!(true));
        Ok(details)
    }

    fn describe(&self, params: &Parameters) -> String {
        let name = params
            .get("database_name")
            .and_then(Value::as_str)
            .unwrap_or("<no database>");
        format!("Recreate database: {}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_fallback_reports_encryption_disabled() {
        let details = SqliteFallbackHandler
            .run(&params(json!({"preserve_data": false})))
            .await
            .unwrap();
        assert_eq!(details["encryption_enabled"], json!(false));
        assert_eq!(details["preserve_data"], json!(false));
    }

    #[tokio::test]
    async fn test_pragmas_applied_and_forbidden_skipped() {
        let details = OptimizePragmasHandler
            .run(&params(json!({
                "pragmas": {"journal_mode": "WAL", "KEY": "secret", "cache_size": -2000}
            })))
            .await
            .unwrap();
        let applied = details["applied_pragmas"].as_object().unwrap();
        assert_eq!(applied["journal_mode"], json!("WAL"));
        assert_eq!(applied["cache_size"], json!(-2000));
        assert!(!applied.contains_key("key"));
        assert_eq!(details["skipped_pragmas"], json!(["KEY"]));
    }

    #[tokio::test]
    async fn test_pragmas_missing_is_invalid() {
        let err = OptimizePragmasHandler.run(&Parameters::new()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_pragmas_only_forbidden_fails() {
        let err = OptimizePragmasHandler
            .run(&params(json!({"pragmas": {"rekey": "x"}})))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::HandlerFailed(_)));
    }

    #[tokio::test]
    async fn test_recreate_with_backup() {
        let details = RecreateDatabaseHandler
            .run(&params(json!({"database_name": "app.db", "backup_first": true})))
            .await
            .unwrap();
        assert_eq!(details["backup_file"], json!("app.db.bak"));
    }

    #[tokio::test]
    async fn test_recreate_rejects_paths() {
        let err = RecreateDatabaseHandler
            .run(&params(json!({"database_name": "../etc/app.db"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidParameters(_)));
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            OptimizePragmasHandler.describe(&params(json!({"pragmas": {"synchronous": "NORMAL"}}))),
            "Apply PRAGMAs: synchronous"
        );
        assert_eq!(
            RecreateDatabaseHandler.describe(&Parameters::new()),
            "Recreate database: <no database>"
        );
    }
}
