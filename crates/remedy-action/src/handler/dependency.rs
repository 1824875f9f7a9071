//! Dependency availability check.
//!
//! Read-only: compares the requested dependency names against the set the
//! host process reports as loaded.

use std::collections::BTreeSet;

use async_trait::async_trait;
use remedy_core::types::Parameters;
use serde_json::{json, Value};

use crate::error::ExecutionError;
use crate::handler::RemediationHandler;

/// Dependencies bundled with every build.
pub const BUNDLED_DEPENDENCIES: &[&str] = &["sqlite3", "sqflite_common_ffi", "path_provider"];

pub struct DependencyCheckHandler {
    available: BTreeSet<String>,
}

impl DependencyCheckHandler {
    pub fn new<I, S>(available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: available.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for DependencyCheckHandler {
    fn default() -> Self {
        Self::new(BUNDLED_DEPENDENCIES.iter().copied())
    }
}

#[async_trait]
impl RemediationHandler for DependencyCheckHandler {
    async fn run(&self, params: &Parameters) -> Result<Parameters, ExecutionError> {
        let required = match params.get("required_dependencies") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        ExecutionError::InvalidParameters(
                            "required_dependencies must contain strings".to_string(),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ExecutionError::InvalidParameters(
                    "required_dependencies must be an array".to_string(),
                ))
            }
        };

        let missing: Vec<&String> = required
            .iter()
            .filter(|dep| !self.available.contains(dep.as_str()))
            .collect();

        if !missing.is_empty() {
            tracing::warn!(?missing, "Missing dependencies detected");
        }

        let mut details = Parameters::new();
        details.insert("dependencies_ok".to_string(), json!(missing.is_empty()));
        details.insert("checked".to_string(), json!(required));
        details.insert("missing".to_string(), json!(missing));
        Ok(details)
    }

    fn describe(&self, params: &Parameters) -> String {
        let count = params
            .get("required_dependencies")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        format!("Check {} dependencies", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required(deps: Value) -> Parameters {
        let mut params = Parameters::new();
        params.insert("required_dependencies".to_string(), deps);
        params
    }

    #[tokio::test]
    async fn test_bundled_dependencies_are_ok() {
        let details = DependencyCheckHandler::default()
            .run(&required(json!(BUNDLED_DEPENDENCIES)))
            .await
            .unwrap();
        assert_eq!(details["dependencies_ok"], json!(true));
        assert_eq!(details["missing"], json!([]));
        assert_eq!(details["checked"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_dependency_reported() {
        let details = DependencyCheckHandler::new(["sqlite3"])
            .run(&required(json!(["sqlite3", "sqlcipher"])))
            .await
            .unwrap();
        assert_eq!(details["dependencies_ok"], json!(false));
        assert_eq!(details["missing"], json!(["sqlcipher"]));
    }

    #[tokio::test]
    async fn test_no_requirements_is_ok() {
        let details = DependencyCheckHandler::default()
            .run(&Parameters::new())
            .await
            .unwrap();
        assert_eq!(details["dependencies_ok"], json!(true));
    }

    #[tokio::test]
    async fn test_non_array_is_invalid() {
        let err = DependencyCheckHandler::default()
            .run(&required(json!("sqlite3")))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidParameters(_)));
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            DependencyCheckHandler::default().describe(&required(json!(["a", "b"]))),
            "Check 2 dependencies"
        );
    }
}
