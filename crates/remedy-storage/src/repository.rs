//! Result persistence contract and its SQLite implementation.

use std::sync::Arc;

use rusqlite::types::ToSql;
use uuid::Uuid;

use remedy_core::error::RemedyError;
use remedy_core::types::{Parameters, RemediationResult, RollbackInfo, Timestamp};

use crate::db::Database;

/// Filter for [`ResultRepository::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultFilter {
    pub action_id: Option<String>,
    pub success: Option<bool>,
    /// Only results executed at or after this instant.
    pub since: Option<Timestamp>,
    pub limit: Option<usize>,
}

impl ResultFilter {
    pub fn for_action(action_id: impl Into<String>) -> Self {
        Self {
            action_id: Some(action_id.into()),
            ..Self::default()
        }
    }
}

/// Save/load contract for the append-only result history.
///
/// Results come back in insertion order.
pub trait ResultRepository: Send + Sync {
    fn put(&self, result: &RemediationResult) -> Result<(), RemedyError>;
    fn query(&self, filter: &ResultFilter) -> Result<Vec<RemediationResult>, RemedyError>;
}

/// SQLite-backed [`ResultRepository`].
pub struct SqliteResultRepository {
    db: Arc<Database>,
}

impl SqliteResultRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Count stored results.
    pub fn count(&self) -> Result<u64, RemedyError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM remediation_results", [], |row| row.get(0))
                .map_err(|e| RemedyError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

impl ResultRepository for SqliteResultRepository {
    fn put(&self, result: &RemediationResult) -> Result<(), RemedyError> {
        let details = serde_json::to_string(&result.execution_details)?;
        let warnings = serde_json::to_string(&result.warnings)?;
        let rollback_of = result
            .rollback_info
            .as_ref()
            .map(|info| info.original_result_id.to_string());

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO remediation_results
                    (id, action_id, executed_at, actual_time_ms, success, error_message,
                     execution_details, warnings, rollback_of)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    result.id.to_string(),
                    result.action_id,
                    result.executed_at.0,
                    result.actual_time_ms as i64,
                    result.success as i32,
                    result.error_message,
                    details,
                    warnings,
                    rollback_of,
                ],
            )
            .map_err(|e| RemedyError::Storage(format!("Failed to save result: {}", e)))?;
            Ok(())
        })
    }

    fn query(&self, filter: &ResultFilter) -> Result<Vec<RemediationResult>, RemedyError> {
        let mut sql = String::from(
            "SELECT id, action_id, executed_at, actual_time_ms, success, error_message,
                    execution_details, warnings, rollback_of
             FROM remediation_results WHERE 1 = 1",
        );
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(ref action_id) = filter.action_id {
            params.push(Box::new(action_id.clone()));
            sql.push_str(&format!(" AND action_id = ?{}", params.len()));
        }
        if let Some(success) = filter.success {
            params.push(Box::new(success as i32));
            sql.push_str(&format!(" AND success = ?{}", params.len()));
        }
        if let Some(since) = filter.since {
            params.push(Box::new(since.0));
            sql.push_str(&format!(" AND executed_at >= ?{}", params.len()));
        }
        sql.push_str(" ORDER BY seq ASC");
        if let Some(limit) = filter.limit {
            params.push(Box::new(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| RemedyError::Storage(e.to_string()))?;
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

            let rows = stmt
                .query_map(&refs[..], |row| {
                    Ok(StoredRow {
                        id: row.get(0)?,
                        action_id: row.get(1)?,
                        executed_at: row.get(2)?,
                        actual_time_ms: row.get(3)?,
                        success: row.get(4)?,
                        error_message: row.get(5)?,
                        execution_details: row.get(6)?,
                        warnings: row.get(7)?,
                        rollback_of: row.get(8)?,
                    })
                })
                .map_err(|e| RemedyError::Storage(e.to_string()))?;

            let mut results = Vec::new();
            for row in rows {
                let row = row.map_err(|e| RemedyError::Storage(e.to_string()))?;
                results.push(row.into_result()?);
            }
            Ok(results)
        })
    }
}

/// Raw column values, decoded outside the rusqlite row callback.
struct StoredRow {
    id: String,
    action_id: String,
    executed_at: i64,
    actual_time_ms: i64,
    success: i32,
    error_message: Option<String>,
    execution_details: String,
    warnings: String,
    rollback_of: Option<String>,
}

impl StoredRow {
    fn into_result(self) -> Result<RemediationResult, RemedyError> {
        let id = parse_uuid(&self.id)?;
        let rollback_info = match self.rollback_of {
            Some(original) => Some(RollbackInfo {
                original_result_id: parse_uuid(&original)?,
            }),
            None => None,
        };
        let execution_details: Parameters = serde_json::from_str(&self.execution_details)?;
        let warnings: Vec<String> = serde_json::from_str(&self.warnings)?;

        Ok(RemediationResult {
            id,
            action_id: self.action_id,
            executed_at: Timestamp(self.executed_at),
            actual_time_ms: self.actual_time_ms.max(0) as u64,
            success: self.success != 0,
            error_message: self.error_message,
            execution_details,
            warnings,
            rollback_info,
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, RemedyError> {
    Uuid::parse_str(raw).map_err(|e| RemedyError::Storage(format!("Invalid UUID '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_repo() -> SqliteResultRepository {
        SqliteResultRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn details(key: &str, value: serde_json::Value) -> Parameters {
        let mut map = Parameters::new();
        map.insert(key.to_string(), value);
        map
    }

    #[test]
    fn test_put_and_query_preserves_fields() {
        let repo = make_repo();
        let ok = RemediationResult::succeeded(
            "dependency_check",
            Timestamp(1_700_000_000),
            42,
            details("dependencies_ok", json!(true)),
            vec!["Prerequisite 'x' is not recognized".to_string()],
        );
        repo.put(&ok).unwrap();

        let loaded = repo.query(&ResultFilter::default()).unwrap();
        assert_eq!(loaded, vec![ok]);
    }

    #[test]
    fn test_failed_and_rollback_results_survive_storage() {
        let repo = make_repo();
        let failed = RemediationResult::failed(
            "optimize_pragmas",
            Timestamp(100),
            5,
            "database is locked",
            Parameters::new(),
            vec![],
        );
        let rollback = RemediationResult::rolled_back(
            "optimize_pragmas",
            failed.id,
            Timestamp(200),
            1,
            details("restored", json!("defaults")),
        );
        repo.put(&failed).unwrap();
        repo.put(&rollback).unwrap();

        let loaded = repo.query(&ResultFilter::default()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].error_message.as_deref(), Some("database is locked"));
        assert_eq!(
            loaded[1].rollback_info.as_ref().unwrap().original_result_id,
            failed.id
        );
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let repo = make_repo();
        let result =
            RemediationResult::succeeded("a", Timestamp(1), 1, Parameters::new(), vec![]);
        repo.put(&result).unwrap();
        assert!(matches!(repo.put(&result), Err(RemedyError::Storage(_))));
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_query_filters() {
        let repo = make_repo();
        repo.put(&RemediationResult::succeeded("a", Timestamp(10), 1, Parameters::new(), vec![]))
            .unwrap();
        repo.put(&RemediationResult::failed("a", Timestamp(20), 1, "boom", Parameters::new(), vec![]))
            .unwrap();
        repo.put(&RemediationResult::succeeded("b", Timestamp(30), 1, Parameters::new(), vec![]))
            .unwrap();

        assert_eq!(repo.query(&ResultFilter::for_action("a")).unwrap().len(), 2);

        let failures = repo
            .query(&ResultFilter {
                success: Some(false),
                ..ResultFilter::default()
            })
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].action_id, "a");

        let recent = repo
            .query(&ResultFilter {
                since: Some(Timestamp(20)),
                ..ResultFilter::default()
            })
            .unwrap();
        assert_eq!(recent.len(), 2);

        let limited = repo
            .query(&ResultFilter {
                limit: Some(1),
                ..ResultFilter::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].executed_at, Timestamp(10));
    }

    #[test]
    fn test_results_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.db");
        let result =
            RemediationResult::succeeded("a", Timestamp(5), 1, Parameters::new(), vec![]);
        {
            let repo = SqliteResultRepository::new(Arc::new(Database::new(&path).unwrap()));
            repo.put(&result).unwrap();
        }
        let repo = SqliteResultRepository::new(Arc::new(Database::new(&path).unwrap()));
        assert_eq!(repo.query(&ResultFilter::default()).unwrap(), vec![result]);
    }
}
