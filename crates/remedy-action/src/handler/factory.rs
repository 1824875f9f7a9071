//! Database factory reset handler.

use async_trait::async_trait;
use remedy_core::types::Parameters;
use serde_json::{json, Value};

use crate::error::ExecutionError;
use crate::handler::{required_str, RemediationHandler};

/// Reinitializes the platform database factory.
pub struct ResetFactoryHandler {
    supported: Vec<String>,
}

impl ResetFactoryHandler {
    /// Handler accepting the `ffi`, `native` and `web` factories.
    pub fn new() -> Self {
        Self::with_supported(["ffi", "native", "web"])
    }

    pub fn with_supported<I, S>(factories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: factories.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for ResetFactoryHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemediationHandler for ResetFactoryHandler {
    async fn run(&self, params: &Parameters) -> Result<Parameters, ExecutionError> {
        let factory = required_str(params, "factory")?;
        if !self.supported.iter().any(|s| s == factory) {
            return Err(ExecutionError::HandlerFailed(format!(
                "unsupported database factory '{}'",
                factory
            )));
        }
        tracing::info!(factory = %factory, "Database factory reset staged");

        let mut details = Parameters::new();
        details.insert("factory".to_string(), json!(factory));
        details.insert("reinitialized".to_string(), json!(true));
        Ok(details)
    }

    fn describe(&self, params: &Parameters) -> String {
        let factory = params
            .get("factory")
            .and_then(Value::as_str)
            .unwrap_or("<default>");
        format!("Reset database factory to {}", factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reset_supported_factory() {
        let mut params = Parameters::new();
        params.insert("factory".to_string(), json!("ffi"));
        let details = ResetFactoryHandler::new().run(&params).await.unwrap();
        assert_eq!(details["factory"], json!("ffi"));
        assert_eq!(details["reinitialized"], json!(true));
    }

    #[tokio::test]
    async fn test_reset_unsupported_factory_fails() {
        let mut params = Parameters::new();
        params.insert("factory".to_string(), json!("ffi"));
        let err = ResetFactoryHandler::with_supported(["web"])
            .run(&params)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::HandlerFailed("unsupported database factory 'ffi'".to_string())
        );
    }

    #[tokio::test]
    async fn test_reset_missing_factory() {
        let err = ResetFactoryHandler::default()
            .run(&Parameters::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidParameters(_)));
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            ResetFactoryHandler::new().describe(&Parameters::new()),
            "Reset database factory to <default>"
        );
    }
}
