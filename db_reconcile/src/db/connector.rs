//! Connector abstraction
//!
//! One capability set over every supported engine. Connectors pass SQL through
//! untouched; rendering dialect-correct SQL is the caller's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::engine::{CaseRules, Engine};
use crate::error::Result;

/// An engine-neutral SQL value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Textual rendering used for key and row comparison; `None` for NULL
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(b.iter().map(|byte| format!("{:02x}", byte)).collect()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

/// One result row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }
}

/// A table as listed by `get_tables`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub estimated_rows: Option<i64>,
}

/// A column exactly as the engine reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub ordinal_position: u32,
    pub auto_increment: bool,
}

/// An index exactly as the engine reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIndex {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub backs_constraint: bool,
}

/// A foreign key exactly as the engine reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

/// Structure of one table before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<RawColumn>,
    pub primary_key: Vec<String>,
    pub primary_key_name: Option<String>,
    pub indexes: Vec<RawIndex>,
    pub foreign_keys: Vec<RawForeignKey>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            primary_key_name: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Outcome of `test_connection`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
}

/// One server session held for a sequence of statements.
///
/// Session-scoped settings and an explicit `BEGIN` stay in effect until the session
/// is dropped, which returns it to its pool.
#[async_trait]
pub trait Session: Send {
    /// Run a parameterless statement returning the affected row count
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Run a parameterless statement returning rows
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>>;
}

/// Uniform capability set over engine-specific drivers.
///
/// Implementations must hand every call (and every transaction) its own session, so a
/// connector may be used from concurrent tasks.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Engine behind this connector
    fn engine(&self) -> Engine;

    /// Close the underlying sessions
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Run a statement returning rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement returning the affected row count
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Run statements in one transaction; on failure everything is rolled back and
    /// the error names the failing statement's index within `statements`
    async fn execute_in_transaction(&self, statements: &[String]) -> Result<u64>;

    /// Pin one session for statements that must share connection state
    async fn session(&self) -> Result<Box<dyn Session>>;

    async fn get_schemas(&self) -> Result<Vec<String>>;

    async fn get_tables(&self, schema: &str) -> Result<Vec<TableInfo>>;

    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<TableSchema>;

    async fn get_server_version(&self) -> Result<String>;

    /// Schema unqualified names resolve to on this session
    async fn current_schema(&self) -> Result<String>;

    /// Identifier comparison rules of this server
    async fn case_rules(&self) -> Result<CaseRules>;

    async fn test_connection(&self) -> ConnectionTest {
        match self.get_server_version().await {
            Ok(version) => ConnectionTest {
                success: true,
                message: format!("Connected to {} ({})", self.engine(), version),
            },
            Err(e) => ConnectionTest {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_text_rendering() {
        assert_eq!(Value::Null.to_text(), None);
        assert_eq!(Value::Int(42).to_text().as_deref(), Some("42"));
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_text().as_deref(), Some("dead"));
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn row_lookup_by_name() {
        let row = Row {
            columns: vec!["id".into(), "name".into()],
            values: vec![Value::Int(1), Value::from("ada")],
        };
        assert_eq!(row.get_by_name("name"), Some(&Value::Text("ada".into())));
        assert_eq!(row.get_by_name("missing"), None);
    }
}
