//! Append-only result log and the statistics projected from it.
//!
//! Readers take consistent snapshots under a read lock. When a
//! [`ResultRepository`] is attached every recorded result is written
//! through to it; a failed write is logged and the in-memory log stays
//! authoritative.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use remedy_core::error::RemedyError;
use remedy_core::types::{RemediationResult, Timestamp};
use remedy_storage::{ResultFilter, ResultRepository};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::ActionCatalog;
use crate::types::ExecutionStatistics;

const DAY_SECS: i64 = 24 * 60 * 60;

#[derive(Default)]
struct Log {
    results: Vec<RemediationResult>,
    by_id: HashMap<Uuid, usize>,
}

impl Log {
    fn push(&mut self, result: RemediationResult) -> bool {
        if self.by_id.contains_key(&result.id) {
            return false;
        }
        self.by_id.insert(result.id, self.results.len());
        self.results.push(result);
        true
    }
}

pub struct HistoryStore {
    log: RwLock<Log>,
    repository: Option<Arc<dyn ResultRepository>>,
}

impl HistoryStore {
    /// In-memory only store.
    pub fn new() -> Self {
        Self {
            log: RwLock::new(Log::default()),
            repository: None,
        }
    }

    /// Store that writes every recorded result through to `repository`.
    pub fn with_repository(repository: Arc<dyn ResultRepository>) -> Self {
        Self {
            log: RwLock::new(Log::default()),
            repository: Some(repository),
        }
    }

    /// Load previously persisted results into memory. Returns how many were
    /// added; results already present are skipped.
    pub fn hydrate(&self) -> Result<usize, RemedyError> {
        let Some(ref repository) = self.repository else {
            return Ok(0);
        };
        let stored = repository.query(&ResultFilter::default())?;
        let mut log = self.log.write().unwrap_or_else(PoisonError::into_inner);
        let added = stored.into_iter().filter(|r| log.push(r.clone())).count();
        debug!(added, "History hydrated from repository");
        Ok(added)
    }

    /// Append a result. Returns `false` if a result with the same id was
    /// already recorded.
    pub fn record(&self, result: RemediationResult) -> bool {
        if let Some(ref repository) = self.repository {
            if let Err(e) = repository.put(&result) {
                warn!(result_id = %result.id, error = %e, "Failed to persist remediation result");
            }
        }
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result)
    }

    pub fn get(&self, id: &Uuid) -> Option<RemediationResult> {
        let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
        log.by_id.get(id).map(|&idx| log.results[idx].clone())
    }

    /// Snapshot of every result, oldest first.
    pub fn all(&self) -> Vec<RemediationResult> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .clone()
    }

    /// The last `limit` results, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<RemediationResult> {
        let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
        let start = log.results.len().saturating_sub(limit);
        log.results[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.log.read().unwrap_or_else(PoisonError::into_inner).results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent execution time of an action. Rollback records are not
    /// executions and are ignored; failed executions count.
    pub fn last_execution_of(&self, action_id: &str) -> Option<Timestamp> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .iter()
            .filter(|r| r.action_id == action_id && !r.is_rollback())
            .map(|r| r.executed_at)
            .max()
    }

    /// Failed executions at or after `since`.
    pub fn failures_since(&self, since: Timestamp) -> usize {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .iter()
            .filter(|r| !r.success && !r.is_rollback() && r.executed_at >= since)
            .count()
    }

    /// History-derived counters. Live gauges are left at zero for the
    /// caller to fill in.
    pub fn statistics(&self, catalog: &ActionCatalog, now: Timestamp) -> ExecutionStatistics {
        let results = self.all();
        let day_ago = now.minus_secs(DAY_SECS);
        let mut stats = ExecutionStatistics::default();

        for result in &results {
            if result.is_rollback() {
                stats.rollbacks += 1;
                continue;
            }
            stats.total_executions += 1;
            if result.success {
                stats.successful_executions += 1;
            } else {
                stats.failed_executions += 1;
            }
            if result.executed_at >= day_ago {
                stats.executions_last_24h += 1;
                if !result.success {
                    stats.failures_last_24h += 1;
                }
            }
            if let Some(action) = catalog.find(&result.action_id) {
                *stats
                    .by_action_type
                    .entry(action.action_type.to_string())
                    .or_default() += 1;
                *stats.by_urgency.entry(action.urgency.to_string()).or_default() += 1;
            }
        }

        if stats.total_executions > 0 {
            stats.success_rate =
                stats.successful_executions as f64 / stats.total_executions as f64;
        }
        stats
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use remedy_core::types::Parameters;
    use remedy_storage::{Database, SqliteResultRepository};

    fn ok(action_id: &str, at: i64) -> RemediationResult {
        RemediationResult::succeeded(action_id, Timestamp(at), 1, Parameters::new(), vec![])
    }

    fn failed(action_id: &str, at: i64) -> RemediationResult {
        RemediationResult::failed(action_id, Timestamp(at), 1, "boom", Parameters::new(), vec![])
    }

    #[test]
    fn test_record_is_append_only_by_id() {
        let store = HistoryStore::new();
        let result = ok("a", 10);
        assert!(store.record(result.clone()));
        assert!(!store.record(result.clone()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&result.id), Some(result));
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let store = HistoryStore::new();
        for at in 1..=5 {
            store.record(ok("a", at));
        }
        let tail: Vec<i64> = store.recent(2).iter().map(|r| r.executed_at.0).collect();
        assert_eq!(tail, vec![4, 5]);
        assert_eq!(store.recent(50).len(), 5);
    }

    #[test]
    fn test_last_execution_ignores_rollbacks() {
        let store = HistoryStore::new();
        let original = failed("a", 100);
        store.record(original.clone());
        store.record(RemediationResult::rolled_back(
            "a",
            original.id,
            Timestamp(500),
            1,
            Parameters::new(),
        ));
        assert_eq!(store.last_execution_of("a"), Some(Timestamp(100)));
        assert_eq!(store.last_execution_of("b"), None);
    }

    #[test]
    fn test_failures_since() {
        let store = HistoryStore::new();
        store.record(failed("a", 10));
        store.record(failed("a", 20));
        store.record(ok("a", 30));
        assert_eq!(store.failures_since(Timestamp(15)), 1);
        assert_eq!(store.failures_since(Timestamp(0)), 2);
    }

    #[test]
    fn test_statistics_breakdowns_skip_removed_actions() {
        let catalog = ActionCatalog::with_builtin();
        let store = HistoryStore::new();
        let now = Timestamp(1_700_000_000);
        store.record(ok(catalog::DEPENDENCY_CHECK, now.0 - 10));
        store.record(failed(catalog::OPTIMIZE_PRAGMAS, now.0 - 10));
        store.record(ok(catalog::RECREATE_DATABASE, now.0 - 2 * DAY_SECS));
        catalog.remove(catalog::RECREATE_DATABASE);

        let stats = store.statistics(&catalog, now);
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_executions, 2);
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.executions_last_24h, 2);
        assert_eq!(stats.failures_last_24h, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.by_urgency.get("low"), Some(&1));
        assert_eq!(stats.by_urgency.get("normal"), Some(&1));
        assert_eq!(stats.by_urgency.get("emergency"), None);
        assert_eq!(stats.by_action_type.values().sum::<usize>(), 2);
    }

    #[test]
    fn test_write_through_and_hydrate() {
        let repo: Arc<dyn ResultRepository> = Arc::new(SqliteResultRepository::new(Arc::new(
            Database::in_memory().unwrap(),
        )));
        let first = HistoryStore::with_repository(Arc::clone(&repo));
        first.record(ok("a", 1));
        first.record(failed("b", 2));

        let second = HistoryStore::with_repository(repo);
        assert_eq!(second.hydrate().unwrap(), 2);
        assert_eq!(second.hydrate().unwrap(), 0);
        assert_eq!(second.all(), first.all());
    }

    #[test]
    fn test_hydrate_without_repository_is_noop() {
        assert_eq!(HistoryStore::new().hydrate().unwrap(), 0);
    }
}
