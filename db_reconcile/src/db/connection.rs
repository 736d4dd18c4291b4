//! Database connection handling
//!
//! This module establishes pool-backed connections and implements the [`Connector`]
//! capability set over them.

use async_trait::async_trait;
use sqlx::{
    mysql::MySqlPoolOptions, pool::PoolConnection, postgres::PgPoolOptions,
    sqlite::SqlitePoolOptions, Executor, MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool,
};
use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::db::connector::{
    ConnectionTest, Connector, Row, Session, TableInfo, TableSchema, Value,
};
use crate::db::engine::{CaseRules, Engine};
use crate::db::{mysql, postgres, sqlite};
use crate::error::{connect_error, Error, Result};

/// Live, pool-backed connection to one supported engine
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    Postgres(PgPool),
    MySql { pool: MySqlPool, mariadb: bool },
    Sqlite(SqlitePool),
}

macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                Value::Text(s) => query.bind(s.as_str()),
                Value::Bytes(b) => query.bind(b.as_slice()),
            };
        }
        query
    }};
}

macro_rules! in_transaction {
    ($pool:expr, $statements:expr) => {{
        let mut tx = $pool.begin().await?;
        let mut affected = 0u64;
        for (index, statement) in $statements.iter().enumerate() {
            match (&mut *tx).execute(statement.as_str()).await {
                Ok(done) => affected += done.rows_affected(),
                Err(e) => {
                    let message = Error::from(e).to_string();
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(error = %rollback, "Rollback failed");
                    }
                    return Err(Error::StatementExecution {
                        index,
                        statement: statement.clone(),
                        message,
                    });
                }
            }
        }
        tx.commit().await?;
        Ok(affected)
    }};
}

/// A pool connection checked out for the lifetime of a [`Session`]
pub enum PooledSession {
    Postgres(PoolConnection<Postgres>),
    MySql(PoolConnection<MySql>),
    Sqlite(PoolConnection<Sqlite>),
}

#[async_trait]
impl Session for PooledSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        tracing::trace!(sql, "session execute");
        let affected = match self {
            PooledSession::Postgres(conn) => (&mut **conn).execute(sql).await?.rows_affected(),
            PooledSession::MySql(conn) => (&mut **conn).execute(sql).await?.rows_affected(),
            PooledSession::Sqlite(conn) => (&mut **conn).execute(sql).await?.rows_affected(),
        };
        Ok(affected)
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        tracing::trace!(sql, "session query");
        match self {
            PooledSession::Postgres(conn) => sqlx::query(sql)
                .fetch_all(&mut **conn)
                .await?
                .iter()
                .map(postgres::decode_row)
                .collect(),
            PooledSession::MySql(conn) => sqlx::query(sql)
                .fetch_all(&mut **conn)
                .await?
                .iter()
                .map(mysql::decode_row)
                .collect(),
            PooledSession::Sqlite(conn) => sqlx::query(sql)
                .fetch_all(&mut **conn)
                .await?
                .iter()
                .map(sqlite::decode_row)
                .collect(),
        }
    }
}

impl DatabaseConnection {
    /// Create a new database connection from configuration
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let engine = config.engine()?;
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(30));

        match engine {
            Engine::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.pool_size.unwrap_or(10))
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await
                    .map_err(connect_error)?;

                Ok(DatabaseConnection::Postgres(pool))
            }
            Engine::MySql | Engine::MariaDb => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(config.pool_size.unwrap_or(10))
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await
                    .map_err(connect_error)?;

                let version = mysql::server_version(&pool).await?;
                let mariadb =
                    engine == Engine::MariaDb || version.to_ascii_lowercase().contains("mariadb");

                Ok(DatabaseConnection::MySql { pool, mariadb })
            }
            Engine::Sqlite => {
                // an in-memory database lives only as long as its one connection
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.pool_size.unwrap_or(1))
                    .acquire_timeout(timeout)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect(&config.url)
                    .await
                    .map_err(connect_error)?;

                Ok(DatabaseConnection::Sqlite(pool))
            }
        }
    }
}

#[async_trait]
impl Connector for DatabaseConnection {
    fn engine(&self) -> Engine {
        match self {
            DatabaseConnection::Postgres(_) => Engine::Postgres,
            DatabaseConnection::MySql { mariadb: true, .. } => Engine::MariaDb,
            DatabaseConnection::MySql { .. } => Engine::MySql,
            DatabaseConnection::Sqlite(_) => Engine::Sqlite,
        }
    }

    async fn disconnect(&self) {
        match self {
            DatabaseConnection::Postgres(pool) => pool.close().await,
            DatabaseConnection::MySql { pool, .. } => pool.close().await,
            DatabaseConnection::Sqlite(pool) => pool.close().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            DatabaseConnection::Postgres(pool) => !pool.is_closed(),
            DatabaseConnection::MySql { pool, .. } => !pool.is_closed(),
            DatabaseConnection::Sqlite(pool) => !pool.is_closed(),
        }
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::trace!(sql, params = params.len(), "query");
        match self {
            DatabaseConnection::Postgres(pool) => bind_params!(sqlx::query(sql), params)
                .fetch_all(pool)
                .await?
                .iter()
                .map(postgres::decode_row)
                .collect(),
            DatabaseConnection::MySql { pool, .. } => bind_params!(sqlx::query(sql), params)
                .fetch_all(pool)
                .await?
                .iter()
                .map(mysql::decode_row)
                .collect(),
            DatabaseConnection::Sqlite(pool) => bind_params!(sqlx::query(sql), params)
                .fetch_all(pool)
                .await?
                .iter()
                .map(sqlite::decode_row)
                .collect(),
        }
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::trace!(sql, params = params.len(), "execute");
        // parameterless statements go over the simple protocol, which accepts any DDL
        let affected = match self {
            DatabaseConnection::Postgres(pool) if params.is_empty() => {
                pool.execute(sql).await?.rows_affected()
            }
            DatabaseConnection::Postgres(pool) => bind_params!(sqlx::query(sql), params)
                .execute(pool)
                .await?
                .rows_affected(),
            DatabaseConnection::MySql { pool, .. } if params.is_empty() => {
                pool.execute(sql).await?.rows_affected()
            }
            DatabaseConnection::MySql { pool, .. } => bind_params!(sqlx::query(sql), params)
                .execute(pool)
                .await?
                .rows_affected(),
            DatabaseConnection::Sqlite(pool) if params.is_empty() => {
                pool.execute(sql).await?.rows_affected()
            }
            DatabaseConnection::Sqlite(pool) => bind_params!(sqlx::query(sql), params)
                .execute(pool)
                .await?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn execute_in_transaction(&self, statements: &[String]) -> Result<u64> {
        tracing::trace!(statements = statements.len(), "transaction");
        match self {
            DatabaseConnection::Postgres(pool) => in_transaction!(pool, statements),
            DatabaseConnection::MySql { pool, .. } => in_transaction!(pool, statements),
            DatabaseConnection::Sqlite(pool) => in_transaction!(pool, statements),
        }
    }

    async fn session(&self) -> Result<Box<dyn Session>> {
        let session = match self {
            DatabaseConnection::Postgres(pool) => PooledSession::Postgres(pool.acquire().await?),
            DatabaseConnection::MySql { pool, .. } => PooledSession::MySql(pool.acquire().await?),
            DatabaseConnection::Sqlite(pool) => PooledSession::Sqlite(pool.acquire().await?),
        };
        Ok(Box::new(session))
    }

    async fn get_schemas(&self) -> Result<Vec<String>> {
        match self {
            DatabaseConnection::Postgres(pool) => postgres::get_schemas(pool).await,
            DatabaseConnection::MySql { pool, .. } => mysql::get_schemas(pool).await,
            DatabaseConnection::Sqlite(pool) => sqlite::get_schemas(pool).await,
        }
    }

    async fn get_tables(&self, schema: &str) -> Result<Vec<TableInfo>> {
        match self {
            DatabaseConnection::Postgres(pool) => postgres::get_tables(pool, schema).await,
            DatabaseConnection::MySql { pool, .. } => mysql::get_tables(pool, schema).await,
            DatabaseConnection::Sqlite(pool) => sqlite::get_tables(pool, schema).await,
        }
    }

    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<TableSchema> {
        match self {
            DatabaseConnection::Postgres(pool) => {
                postgres::get_table_schema(pool, schema, table).await
            }
            DatabaseConnection::MySql { pool, .. } => {
                mysql::get_table_schema(pool, schema, table).await
            }
            DatabaseConnection::Sqlite(pool) => sqlite::get_table_schema(pool, schema, table).await,
        }
    }

    async fn get_server_version(&self) -> Result<String> {
        match self {
            DatabaseConnection::Postgres(pool) => postgres::server_version(pool).await,
            DatabaseConnection::MySql { pool, .. } => mysql::server_version(pool).await,
            DatabaseConnection::Sqlite(pool) => sqlite::server_version(pool).await,
        }
    }

    async fn current_schema(&self) -> Result<String> {
        match self {
            DatabaseConnection::Postgres(pool) => postgres::current_schema(pool).await,
            DatabaseConnection::MySql { pool, .. } => mysql::current_schema(pool).await,
            DatabaseConnection::Sqlite(_) => Ok("main".to_string()),
        }
    }

    async fn case_rules(&self) -> Result<CaseRules> {
        match self {
            DatabaseConnection::MySql { pool, .. } => mysql::case_rules(pool).await,
            other => Ok(other.engine().default_case_rules()),
        }
    }

    async fn test_connection(&self) -> ConnectionTest {
        if !self.is_connected() {
            return ConnectionTest {
                success: false,
                message: "connection pool is closed".to_string(),
            };
        }
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

    async fn memory() -> DatabaseConnection {
        let config = ConnectionConfig {
            driver: "sqlite".into(),
            url: "sqlite::memory:".into(),
            schema: None,
            pool_size: None,
            timeout_seconds: None,
        };
        DatabaseConnection::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn executes_and_queries_with_params() {
        let conn = memory().await;
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        let inserted = conn
            .execute(
                "INSERT INTO t (id, name) VALUES (?, ?)",
                &[Value::Int(1), Value::from("ada")],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let rows = conn
            .query("SELECT id, name FROM t WHERE id = ?", &[Value::Int(1)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_by_name("name"), Some(&Value::Text("ada".into())));
    }

    #[tokio::test]
    async fn failed_transaction_names_statement_and_rolls_back() {
        let conn = memory().await;
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();

        let statements = vec![
            "INSERT INTO t (id) VALUES (1)".to_string(),
            "INSERT INTO t (id) VALUES (1)".to_string(),
        ];
        let err = conn.execute_in_transaction(&statements).await.unwrap_err();
        assert!(matches!(err, Error::StatementExecution { index: 1, .. }));

        let rows = conn.query("SELECT COUNT(*) AS n FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get(0), Some(&Value::Int(0)));
    }

    #[tokio::test]
    async fn session_keeps_connection_settings() {
        let conn = memory().await;
        let mut session = conn.session().await.unwrap();
        session.execute("PRAGMA foreign_keys = OFF").await.unwrap();
        let rows = session.query("PRAGMA foreign_keys").await.unwrap();
        assert_eq!(rows[0].get(0), Some(&Value::Int(0)));

        session.execute("PRAGMA foreign_keys = ON").await.unwrap();
        drop(session);
        let rows = conn.query("PRAGMA foreign_keys", &[]).await.unwrap();
        assert_eq!(rows[0].get(0), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn unopenable_file_is_a_connection_error() {
        let config = ConnectionConfig {
            driver: "sqlite".into(),
            url: "sqlite:///no/such/dir/x.db".into(),
            schema: None,
            pool_size: None,
            timeout_seconds: Some(5),
        };
        let err = DatabaseConnection::connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Connection { transient: false, .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn reports_connection_test() {
        let conn = memory().await;
        let result = conn.test_connection().await;
        assert!(result.success, "{}", result.message);

        conn.disconnect().await;
        assert!(!conn.is_connected());
        assert!(!conn.test_connection().await.success);
    }
}
