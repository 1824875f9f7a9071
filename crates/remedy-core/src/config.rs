use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RemedyError, Result};

/// Settings for the orchestrator and the `remedy` binary, read from
/// `~/.remedy/config.toml` unless overridden.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemedyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub remediation: RemediationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl RemedyConfig {
    /// Read and validate `path`. Missing sections take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RemedyConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Like [`load`](Self::load), but any failure yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Write as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.remediation.validate()
    }

    /// Full path of the results database.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.general.data_dir)).join(&self.storage.database_file)
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the results database.
    pub data_dir: String,
    /// Default `EnvFilter` directive when neither `--log-level` nor
    /// `RUST_LOG` is set.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.remedy/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Limits and thresholds applied by the constraint evaluator and the
/// recommendation aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    /// Whether `automatic` actions may run without `force`.
    pub allow_automatic_execution: bool,
    /// Ceiling on concurrently executing actions.
    pub max_concurrent_actions: usize,
    /// Actions with a lower expected success rate are denied.
    pub min_success_rate: f64,
    /// Minimum seconds between two non-forced runs of the same action.
    pub cooldown_secs: u64,
    /// Failed results in the last 24 hours above which an investigation is
    /// recommended.
    pub failure_rate_threshold: usize,
    /// Number of most recent results included in the detailed report.
    pub report_history_limit: usize,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            allow_automatic_execution: false,
            max_concurrent_actions: 3,
            min_success_rate: 0.7,
            cooldown_secs: 300,
            failure_rate_threshold: 3,
            report_history_limit: 20,
        }
    }
}

impl RemediationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_success_rate) {
            return Err(RemedyError::Config(format!(
                "remediation.min_success_rate must be within [0, 1], got {}",
                self.min_success_rate
            )));
        }
        if self.max_concurrent_actions == 0 {
            return Err(RemedyError::Config(
                "remediation.max_concurrent_actions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Write every result through to SQLite.
    pub persist_results: bool,
    /// File name inside `general.data_dir`.
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist_results: true,
            database_file: "remediation.db".to_string(),
        }
    }
}

fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return format!("{}/{}", home, rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RemedyConfig::default();
        assert!(!config.remediation.allow_automatic_execution);
        assert_eq!(config.remediation.max_concurrent_actions, 3);
        assert_eq!(config.remediation.cooldown_secs, 300);
        assert_eq!(config.remediation.failure_rate_threshold, 3);
        assert!(config.storage.persist_results);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let config: RemedyConfig = toml::from_str(
            r#"
            [remediation]
            allow_automatic_execution = true
            cooldown_secs = 60
            "#,
        )
        .unwrap();
        assert!(config.remediation.allow_automatic_execution);
        assert_eq!(config.remediation.cooldown_secs, 60);
        assert_eq!(config.remediation.max_concurrent_actions, 3);
        assert_eq!(config.storage.database_file, "remediation.db");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = RemedyConfig::default();
        config.remediation.min_success_rate = 0.8;
        config.general.log_level = "debug".to_string();
        config.save(&path).unwrap();

        let loaded = RemedyConfig::load(&path).unwrap();
        assert_eq!(loaded.remediation, config.remediation);
        assert_eq!(loaded.general.log_level, "debug");
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RemedyConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(RemedyError::Io(_))));
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "remediation = [[[").unwrap();
        let config = RemedyConfig::load_or_default(&path);
        assert_eq!(config.remediation, RemediationConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_success_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[remediation]\nmin_success_rate = 1.5\n").unwrap();
        assert!(matches!(RemedyConfig::load(&path), Err(RemedyError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = RemediationConfig {
            max_concurrent_actions: 0,
            ..RemediationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_joins_data_dir() {
        let mut config = RemedyConfig::default();
        config.general.data_dir = "/var/lib/remedy".to_string();
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/remedy/remediation.db")
        );
    }
}
