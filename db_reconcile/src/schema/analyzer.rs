//! Database schema analyzer
//!
//! This module introspects a live schema through a [`Connector`] and produces a normalized
//! [`SchemaSnapshot`].

use crate::db::connector::Connector;
use crate::db::context::OpContext;
use crate::error::{Error, Result};
use crate::schema::normalize::normalize_table;
use crate::schema::types::{IntrospectionFailure, SchemaSnapshot};

/// Schema analyzer for database schema introspection
pub struct SchemaAnalyzer<'a> {
    connector: &'a dyn Connector,
    ctx: &'a OpContext,
}

impl<'a> SchemaAnalyzer<'a> {
    /// Create a new schema analyzer
    pub fn new(connector: &'a dyn Connector, ctx: &'a OpContext) -> Self {
        Self { connector, ctx }
    }

    /// Resolve an optional schema name to the one the session would use
    pub async fn resolve_schema(&self, schema: Option<&str>) -> Result<String> {
        match schema {
            Some(name) if !name.is_empty() => Ok(name.to_string()),
            _ => {
                self.ctx
                    .run("current schema", self.connector.current_schema())
                    .await
            }
        }
    }

    /// Analyze one schema.
    ///
    /// A table whose metadata cannot be read is recorded in `failures` and left out of
    /// `tables`; connection-level failures and cancellation abort the whole analysis.
    pub async fn analyze(&self, schema: Option<&str>) -> Result<SchemaSnapshot> {
        let engine = self.connector.engine();
        let current = self
            .ctx
            .run("current schema", self.connector.current_schema())
            .await?;
        let schema = match schema {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => current.clone(),
        };

        let case_rules = self
            .ctx
            .run("case rules", self.connector.case_rules())
            .await?;
        let tables = self
            .ctx
            .run("list tables", self.connector.get_tables(&schema))
            .await?;

        let mut snapshot = SchemaSnapshot::new(engine, &schema);
        snapshot.qualify = schema != current;
        snapshot.case_rules = case_rules;

        tracing::debug!(%engine, schema = %schema, tables = tables.len(), "Analyzing schema");

        for info in tables {
            let result = self
                .ctx
                .run(
                    "table introspection",
                    self.connector.get_table_schema(&schema, &info.name),
                )
                .await;

            match result {
                Ok(raw) => snapshot.tables.push(normalize_table(engine, &raw)),
                Err(e @ (Error::Connection { .. } | Error::Cancelled(_))) => return Err(e),
                Err(e) => {
                    let message = match e {
                        Error::Introspection { message, .. } => message,
                        other => other.to_string(),
                    };
                    tracing::warn!(table = %info.name, error = %message, "Table introspection failed");
                    snapshot.failures.push(IntrospectionFailure {
                        table: info.name,
                        message,
                    });
                }
            }
        }

        snapshot.tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(snapshot)
    }
}
