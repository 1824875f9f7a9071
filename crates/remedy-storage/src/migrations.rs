//! Versioned schema for the results database.
//!
//! Each migration runs once, in order, inside its own transaction, and is
//! recorded in `schema_migrations`.

use rusqlite::Connection;
use tracing::info;

use remedy_core::error::RemedyError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "remediation_results",
    sql: "CREATE TABLE remediation_results (
              seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
              id                  TEXT NOT NULL UNIQUE,
              action_id           TEXT NOT NULL,
              executed_at         INTEGER NOT NULL,
              actual_time_ms      INTEGER NOT NULL,
              success             INTEGER NOT NULL CHECK (success IN (0, 1)),
              error_message       TEXT,
              execution_details   TEXT NOT NULL DEFAULT '{}',
              warnings            TEXT NOT NULL DEFAULT '[]',
              rollback_of         TEXT,
              CHECK ((success = 1) = (error_message IS NULL))
          );
          CREATE INDEX idx_results_action ON remediation_results(action_id);
          CREATE INDEX idx_results_executed_at ON remediation_results(executed_at);",
}];

/// Version the schema reaches once every migration has run.
pub const LATEST_VERSION: i64 = 1;

/// Highest applied version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64, RemedyError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| RemedyError::Storage(format!("Failed to query schema version: {}", e)))
}

/// Apply every migration newer than the recorded version.
pub fn run_migrations(conn: &Connection) -> Result<(), RemedyError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| RemedyError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current = current_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let batch = format!(
            "BEGIN;
             {}
             INSERT INTO schema_migrations (version, name) VALUES ({}, '{}');
             COMMIT;",
            migration.sql, migration.version, migration.name
        );
        if let Err(e) = conn.execute_batch(&batch) {
            let _ = conn.execute_batch("ROLLBACK;");
            return Err(RemedyError::Storage(format!(
                "Migration v{} ({}) failed: {}",
                migration.version, migration.name, e
            )));
        }
        info!(version = migration.version, name = migration.name, "Applied migration");
    }
    Ok(())
}
