//! Shared helpers for the integration tests: in-memory SQLite and a recording connector

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use db_reconcile::config::ConnectionConfig;
use db_reconcile::db::connector::{Row, Session, TableInfo, TableSchema, Value};
use db_reconcile::db::engine::{CaseRules, Engine};
use db_reconcile::{Connector, DatabaseConnection, Result};

/// A fresh private in-memory database
pub async fn sqlite() -> DatabaseConnection {
    DatabaseConnection::connect(&ConnectionConfig {
        driver: "sqlite".into(),
        url: "sqlite::memory:".into(),
        schema: None,
        pool_size: None,
        timeout_seconds: None,
    })
    .await
    .expect("in-memory sqlite")
}

/// An in-memory database initialised with `script`
pub async fn sqlite_with(script: &[&str]) -> DatabaseConnection {
    let conn = sqlite().await;
    for sql in script {
        conn.execute(sql, &[]).await.expect(sql);
    }
    conn
}

/// `items(id, name, qty)` filled with ids `1..=rows`
pub async fn items_table(rows: i64) -> DatabaseConnection {
    let conn = sqlite_with(&[
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, qty INTEGER)",
    ])
    .await;
    for id in 1..=rows {
        conn.execute(
            "INSERT INTO items (id, name, qty) VALUES (?, ?, ?)",
            &[Value::Int(id), Value::from(format!("item {}", id)), Value::Int(id * 10)],
        )
        .await
        .expect("insert item");
    }
    conn
}

pub async fn count(conn: &DatabaseConnection, table: &str) -> i64 {
    let rows = conn
        .query(&format!("SELECT COUNT(*) FROM {}", table), &[])
        .await
        .expect("count");
    match rows[0].get(0) {
        Some(Value::Int(n)) => *n,
        other => panic!("unexpected count {:?}", other),
    }
}

/// Forwards to a real connection and records every data statement it sees.
///
/// Metadata calls pass through unrecorded.
pub struct RecordingConnector {
    inner: DatabaseConnection,
    statements: Arc<Mutex<Vec<String>>>,
    transactions: Mutex<usize>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingConnector {
    pub fn new(inner: DatabaseConnection) -> Self {
        Self {
            inner,
            statements: Arc::new(Mutex::new(Vec::new())),
            transactions: Mutex::new(0),
            cancel_after: None,
        }
    }

    /// Trip `token` once `transactions` write transactions have committed
    pub fn cancel_after(mut self, transactions: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((transactions, token));
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// Recorded statements that can change data or structure
    pub fn mutations(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| !sql.trim_start().to_uppercase().starts_with("SELECT"))
            .collect()
    }

    /// Write transactions committed through this connector
    pub fn transactions(&self) -> usize {
        *self.transactions.lock().unwrap()
    }

    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    fn record(&self, sql: &str) {
        self.statements.lock().unwrap().push(sql.to_string());
    }
}

/// Session wrapper feeding the owning connector's statement log
struct RecordingSession {
    inner: Box<dyn Session>,
    statements: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Session for RecordingSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.statements.lock().unwrap().push(sql.to_string());
        self.inner.execute(sql).await
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.statements.lock().unwrap().push(sql.to_string());
        self.inner.query(sql).await
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    fn engine(&self) -> Engine {
        self.inner.engine()
    }

    async fn disconnect(&self) {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record(sql);
        self.inner.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql);
        self.inner.execute(sql, params).await
    }

    async fn execute_in_transaction(&self, statements: &[String]) -> Result<u64> {
        for sql in statements {
            self.record(sql);
        }
        let affected = self.inner.execute_in_transaction(statements).await?;
        let mut seen = self.transactions.lock().unwrap();
        *seen += 1;
        if let Some((after, token)) = &self.cancel_after {
            if *seen >= *after {
                token.cancel();
            }
        }
        Ok(affected)
    }

    async fn session(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(RecordingSession {
            inner: self.inner.session().await?,
            statements: Arc::clone(&self.statements),
        }))
    }

    async fn get_schemas(&self) -> Result<Vec<String>> {
        self.inner.get_schemas().await
    }

    async fn get_tables(&self, schema: &str) -> Result<Vec<TableInfo>> {
        self.inner.get_tables(schema).await
    }

    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<TableSchema> {
        self.inner.get_table_schema(schema, table).await
    }

    async fn get_server_version(&self) -> Result<String> {
        self.inner.get_server_version().await
    }

    async fn current_schema(&self) -> Result<String> {
        self.inner.current_schema().await
    }

    async fn case_rules(&self) -> Result<CaseRules> {
        self.inner.case_rules().await
    }
}
