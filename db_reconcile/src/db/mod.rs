//! Database module for db_reconcile
//!
//! This module handles connections, per-engine introspection and script execution.

pub mod connection;
pub mod connector;
pub mod context;
pub mod engine;
pub mod executor;
mod mysql;
mod postgres;
mod sqlite;

// Re-export key types
pub use connection::DatabaseConnection;
pub use connector::{ConnectionTest, Connector, Row, Session, TableInfo, TableSchema, Value};
pub use context::OpContext;
pub use engine::{CaseRule, CaseRules, Engine};
pub use executor::{apply_migration, ApplyOptions, MigrationOutcome, PlanOutcome, SqlExecutor};
