//! Connection handling for the results database.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rusqlite::Connection;
use tracing::{debug, info};

use remedy_core::error::RemedyError;

use crate::migrations;

/// Applied to every connection before migrations run.
const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA busy_timeout = 5000;";

/// One SQLite connection shared behind a mutex.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create the results database at `path`, creating missing
    /// parent directories, then bring the schema up to date.
    pub fn new(path: &Path) -> Result<Self, RemedyError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| {
            RemedyError::Storage(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let db = Self::prepare(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), schema_version = db.schema_version()?, "Results database ready");
        Ok(db)
    }

    /// Private in-memory database. Used by tests.
    pub fn in_memory() -> Result<Self, RemedyError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RemedyError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::prepare(conn, None)
    }

    fn prepare(conn: Connection, path: Option<PathBuf>) -> Result<Self, RemedyError> {
        conn.execute_batch(CONNECTION_PRAGMAS)
            .map_err(|e| RemedyError::Storage(format!("Failed to set pragmas: {}", e)))?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// File backing this database, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Highest applied migration.
    pub fn schema_version(&self) -> Result<i64, RemedyError> {
        self.with_conn(migrations::current_version)
    }

    /// Run `f` with the connection locked. A poisoned lock is recovered.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, RemedyError>
    where
        F: FnOnce(&Connection) -> Result<T, RemedyError>,
    {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Results database connection acquired");
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_starts_empty_at_latest_schema() {
        let db = Database::in_memory().unwrap();
        assert!(db.path().is_none());
        assert_eq!(db.schema_version().unwrap(), migrations::LATEST_VERSION);

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM remediation_results", [], |row| row.get(0))
                    .map_err(|e| RemedyError::Storage(e.to_string()))
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_file_database_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("remediation.db");
        let db = Database::new(&path).unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
    }

    #[test]
    fn test_reopen_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remediation.db");
        drop(Database::new(&path).unwrap());
        let db = Database::new(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), migrations::LATEST_VERSION);
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("wal.db")).unwrap();
        let mode: String = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|e| RemedyError::Storage(e.to_string()))
            })
            .unwrap();
        assert_eq!(mode, "wal");
    }
}
