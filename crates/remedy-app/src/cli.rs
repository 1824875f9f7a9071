//! CLI argument definitions for the remedy binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use remedy_action::signals::HypothesisCategory;
use uuid::Uuid;

/// Remedy - hypothesis-driven remediation for embedded database failures.
#[derive(Parser, Debug)]
#[command(name = "remedy", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the results database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Allow `automatic` actions to run without --force.
    #[arg(long = "allow-automatic", global = true)]
    pub allow_automatic: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Health, compatibility and hypothesis inputs supplied on the command line.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SignalArgs {
    /// Database health score in [0, 100].
    #[arg(long = "health")]
    pub health: Option<f64>,

    /// Critical compatibility issue text. Repeatable.
    #[arg(long = "critical-issue")]
    pub critical_issues: Vec<String>,

    /// Hypothesis category, e.g. `corrupted_database`. Repeatable.
    #[arg(long = "hypothesis")]
    pub hypotheses: Vec<HypothesisCategory>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the registered remediation actions.
    Catalog,

    /// Execute an action now.
    Execute {
        action_id: String,
        /// Bypass automation, success-rate and cooldown checks.
        #[arg(long)]
        force: bool,
        /// JSON object of parameter overrides.
        #[arg(long = "params")]
        params: Option<String>,
    },

    /// Execute an action once after a delay, then exit.
    Schedule {
        action_id: String,
        #[arg(long = "delay-secs", default_value_t = 5)]
        delay_secs: u64,
        /// JSON object of parameter overrides.
        #[arg(long = "params")]
        params: Option<String>,
    },

    /// Print ranked recommendations for the given signals.
    Recommend {
        #[command(flatten)]
        signals: SignalArgs,
        /// Issue description to analyze before recommending.
        #[arg(long = "issue")]
        issue: Option<String>,
    },

    /// Analyze an issue and run the recommended automatic actions.
    Session {
        issue: String,
        #[arg(long = "error")]
        error: Option<String>,
        #[command(flatten)]
        signals: SignalArgs,
    },

    /// Roll back a recorded result.
    Rollback { result_id: Uuid },

    /// Print execution statistics.
    Stats,

    /// Print the full report.
    Report {
        #[command(flatten)]
        signals: SignalArgs,
    },
}

impl Command {
    /// Signals given to this command, if it accepts any.
    pub fn signals(&self) -> SignalArgs {
        match self {
            Command::Recommend { signals, .. }
            | Command::Session { signals, .. }
            | Command::Report { signals } => signals.clone(),
            _ => SignalArgs::default(),
        }
    }
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > REMEDY_CONFIG env var > ~/.remedy/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("REMEDY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > REMEDY_DATA_DIR env var > config file value.
    /// Returns `None` if neither is overridden.
    pub fn resolve_data_dir(&self) -> Option<String> {
        if let Some(ref p) = self.data_dir {
            return Some(p.to_string_lossy().to_string());
        }
        std::env::var("REMEDY_DATA_DIR").ok()
    }

    /// Resolve the log filter.
    ///
    /// Priority: --log-level flag > RUST_LOG env var > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            return filter;
        }
        config_level.to_string()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".remedy").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".remedy").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_execute_with_force() {
        let args = CliArgs::parse_from(["remedy", "execute", "dependency_check", "--force"]);
        match args.command {
            Command::Execute { action_id, force, params } => {
                assert_eq!(action_id, "dependency_check");
                assert!(force);
                assert!(params.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_recommend_signals() {
        let args = CliArgs::parse_from([
            "remedy",
            "recommend",
            "--health",
            "42",
            "--critical-issue",
            "cipher missing",
            "--hypothesis",
            "corrupted_database",
        ]);
        let signals = args.command.signals();
        assert_eq!(signals.health, Some(42.0));
        assert_eq!(signals.critical_issues, vec!["cipher missing".to_string()]);
        assert_eq!(signals.hypotheses, vec![HypothesisCategory::CorruptedDatabase]);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from(["remedy", "catalog", "--config", "/tmp/remedy.toml"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/remedy.toml"));
    }

    #[test]
    fn test_cli_log_level_wins() {
        let args = CliArgs::parse_from(["remedy", "-l", "debug", "stats"]);
        assert_eq!(args.resolve_log_level("warn"), "debug");
    }

    #[test]
    fn test_rejects_unknown_hypothesis() {
        let parsed = CliArgs::try_parse_from(["remedy", "recommend", "--hypothesis", "gremlins"]);
        assert!(parsed.is_err());
    }
}
