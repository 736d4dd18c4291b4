//! Error types for db_reconcile

use thiserror::Error;

/// Result type for db_reconcile operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for db_reconcile
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error ({}): {message}", transience(.transient))]
    Connection { message: String, transient: bool },

    #[error("Introspection error on table '{table}': {message}")]
    Introspection { table: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Statement {index} failed: {message}")]
    StatementExecution {
        index: usize,
        statement: String,
        message: String,
    },

    #[error("Partial failure: {succeeded} succeeded, {failed} failed")]
    PartialFailure {
        succeeded: usize,
        failed: usize,
        errors: Vec<String>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn transience(transient: &bool) -> &'static str {
    if *transient {
        "transient"
    } else {
        "fatal"
    }
}

impl Error {
    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection { transient: true, .. })
    }

    pub(crate) fn transient(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            transient: true,
        }
    }

    pub(crate) fn fatal(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            transient: false,
        }
    }
}

/// Classify driver errors into the connection taxonomy.
///
/// Auth failures (SQLSTATE class 28, MySQL 1045) and TLS/configuration problems are
/// fatal; I/O and pool exhaustion are transient. Anything the server rejected for a
/// statement stays a plain `Database` error so callers can attach the statement.
impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => {
                Error::transient(error.to_string())
            }
            sqlx::Error::PoolClosed => Error::fatal("connection pool is closed"),
            sqlx::Error::Tls(_) | sqlx::Error::Configuration(_) => Error::fatal(error.to_string()),
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.to_string()).unwrap_or_default();
                if (code.len() == 5 && code.starts_with("28")) || code == "1045" {
                    Error::fatal(db.message().to_string())
                } else {
                    Error::Database(db.message().to_string())
                }
            }
            _ => Error::Database(error.to_string()),
        }
    }
}

/// Classify a failure to open a connection.
///
/// Whatever stops a session from being established (a missing SQLite file, an
/// unknown database) is a connection error; only the transient kinds stay retryable.
pub(crate) fn connect_error(error: sqlx::Error) -> Error {
    match Error::from(error) {
        connection @ Error::Connection { .. } => connection,
        other => Error::fatal(other.to_string()),
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Configuration(error.to_string())
    }
}
