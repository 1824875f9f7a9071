//! Remedy application binary - composition root.
//!
//! 1. Load configuration from TOML and apply CLI overrides
//! 2. Open the results database and hydrate the history from it
//! 3. Build the orchestrator over the built-in catalog and handlers
//! 4. Run one subcommand and print its outcome as JSON

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;

use remedy_action::signals::{Hypothesis, IssueContext, StaticSignals};
use remedy_action::{
    ActionCatalog, Collaborators, HandlerRegistry, HistoryStore, RemediationOrchestrator,
};
use remedy_core::config::RemedyConfig;
use remedy_core::types::Parameters;
use remedy_storage::{Database, SqliteResultRepository};

use cli::{CliArgs, Command, SignalArgs};

/// Longest a `schedule` run waits for its timer's execution to settle.
const SCHEDULE_SETTLE_TIMEOUT: Duration = Duration::from_secs(30);
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

type BoxError = Box<dyn std::error::Error>;

/// Fixed collaborator values built from command-line signals.
fn collaborators(signals: &SignalArgs) -> Collaborators {
    let mut fixed = StaticSignals::new();
    if let Some(health) = signals.health {
        fixed = fixed.with_health(health);
    }
    for issue in &signals.critical_issues {
        fixed = fixed.with_critical_issue(issue.clone());
    }
    for category in &signals.hypotheses {
        fixed = fixed.with_hypothesis(Hypothesis::new(*category, "supplied on the command line", 1.0));
    }
    Collaborators::from_signals(fixed)
}

/// History store, persistent when `storage.persist_results` is set.
fn open_history(config: &RemedyConfig) -> Result<Arc<HistoryStore>, BoxError> {
    if !config.storage.persist_results {
        tracing::info!("Result persistence disabled; history is in-memory");
        return Ok(Arc::new(HistoryStore::new()));
    }

    let db_path = config.database_path();
    let db = Database::new(&db_path).map_err(|e| {
        tracing::error!(path = %db_path.display(), error = %e, "Failed to open results database");
        e
    })?;
    let history = HistoryStore::with_repository(Arc::new(SqliteResultRepository::new(Arc::new(db))));
    let loaded = history.hydrate()?;
    tracing::info!(results = loaded, "History hydrated");
    Ok(Arc::new(history))
}

fn parse_params(raw: Option<&str>) -> Result<Option<Parameters>, BoxError> {
    match raw {
        None => Ok(None),
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(Some(map)),
            other => Err(format!("--params must be a JSON object, got {}", other).into()),
        },
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait until no timer is pending and no execution is in flight.
async fn settle(orchestrator: &RemediationOrchestrator) {
    let deadline = tokio::time::Instant::now() + SCHEDULE_SETTLE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if orchestrator.scheduled_remediations().is_empty() && orchestrator.active_executions() == 0 {
            return;
        }
        tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
    }
    tracing::warn!("Scheduled remediation did not settle before timeout");
}

async fn run(orchestrator: &RemediationOrchestrator, command: Command) -> Result<(), BoxError> {
    match command {
        Command::Catalog => print_json(&orchestrator.catalog().list()),

        Command::Execute { action_id, force, params } => {
            let overrides = parse_params(params.as_deref())?;
            let result = orchestrator.execute_remediation(&action_id, force, overrides).await?;
            print_json(&result)
        }

        Command::Schedule { action_id, delay_secs, params } => {
            let overrides = parse_params(params.as_deref())?;
            let recorded_before = orchestrator.history().len();
            let scheduled = orchestrator.schedule_remediation(
                &action_id,
                Duration::from_secs(delay_secs),
                overrides,
            )?;
            tracing::info!(action_id = %scheduled.action_id, due_at = scheduled.due_at.0, "Waiting for scheduled remediation");
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            settle(orchestrator).await;

            let results: Vec<_> = orchestrator
                .history()
                .all()
                .into_iter()
                .skip(recorded_before)
                .filter(|r| r.action_id == action_id)
                .collect();
            print_json(&serde_json::json!({
                "scheduled": scheduled,
                "results": results,
                "pending_confirmations": orchestrator.pending_confirmations(),
            }))
        }

        Command::Recommend { issue, .. } => {
            let recommendations = match issue {
                Some(issue) => orchestrator.generate_remediations(&issue, None, None, &[]).await?,
                None => orchestrator.get_recommendations().await?,
            };
            print_json(&recommendations)
        }

        Command::Session { issue, error, .. } => {
            let mut context = IssueContext::new(issue);
            context.error = error;
            let outcome = orchestrator.run_session(context).await?;
            print_json(&outcome)
        }

        Command::Rollback { result_id } => {
            let result = orchestrator.rollback_remediation(result_id)?;
            print_json(&result)
        }

        Command::Stats => print_json(&orchestrator.get_execution_statistics()),

        Command::Report { .. } => print_json(&orchestrator.get_detailed_report().await?),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = RemedyConfig::load_or_default(&config_file);
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if args.allow_automatic {
        config.remediation.allow_automatic_execution = true;
    }

    // Tracing goes to stderr so stdout stays valid JSON.
    let filter = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting remedy v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let history = open_history(&config)?;

    // Orchestrator.
    let orchestrator = RemediationOrchestrator::with_parts(
        config.remediation.clone(),
        Arc::new(ActionCatalog::with_builtin()),
        Arc::new(HandlerRegistry::with_defaults()),
        history,
        collaborators(&args.command.signals()),
    );

    let outcome = run(&orchestrator, args.command).await;
    orchestrator.dispose();

    if let Err(ref e) = outcome {
        tracing::error!(error = %e, "Command failed");
    }
    outcome
}
