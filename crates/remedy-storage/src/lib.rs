//! Remedy storage crate - SQLite persistence for remediation results.
//!
//! Provides a WAL-mode SQLite database with migrations and the
//! `ResultRepository` contract (`put` / `query`) the orchestrator writes its
//! append-only history through. Catalog entries are never persisted.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{ResultFilter, ResultRepository, SqliteResultRepository};
