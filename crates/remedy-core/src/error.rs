use thiserror::Error;

/// Top-level error type for the remediation system.
///
/// Subsystem crates define their own error types and wrap `RemedyError`
/// through `#[from]` so that the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemedyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Evidence log error: {0}")]
    Evidence(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid action definition: {0}")]
    InvalidAction(String),
}

impl From<toml::de::Error> for RemedyError {
    fn from(err: toml::de::Error) -> Self {
        RemedyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for RemedyError {
    fn from(err: toml::ser::Error) -> Self {
        RemedyError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RemedyError {
    fn from(err: serde_json::Error) -> Self {
        RemedyError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for remediation operations.
pub type Result<T> = std::result::Result<T, RemedyError>;
