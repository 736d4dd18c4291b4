//! Migration executor
//!
//! This module applies an ordered script to a target connection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::db::connector::{Connector, Session};
use crate::db::context::OpContext;
use crate::db::engine::Engine;
use crate::error::{Error, Result};
use crate::schema::generator::MigrationPlan;

/// How a script is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOptions {
    /// Wrap the script in one transaction where the engine has transactional DDL
    pub transactional: bool,
    /// Log statements without executing them
    pub dry_run: bool,
}

/// Result of applying a script; execution stops at the first failing statement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    /// Statements that took effect (zero when a transaction rolled back)
    pub applied_count: usize,
    pub failed_statement: Option<String>,
    pub error: Option<String>,
    /// Statements never executed
    pub remaining: Vec<String>,
    pub rolled_back: bool,
    pub dry_run: bool,
}

impl MigrationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Turn a failed run into `PartialFailure`
    pub fn into_result(self) -> Result<Self> {
        match &self.error {
            None => Ok(self),
            Some(error) => Err(Error::PartialFailure {
                succeeded: self.applied_count,
                failed: 1,
                errors: vec![error.clone()],
            }),
        }
    }
}

/// Outcome of applying a [`MigrationPlan`], resolved to diff items
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub outcome: MigrationOutcome,
    /// Items whose statements all took effect
    pub completed_items: Vec<usize>,
    pub failed_item: Option<usize>,
}

const FOREIGN_KEYS_OFF: &str = "PRAGMA foreign_keys = OFF";
const FOREIGN_KEYS_ON: &str = "PRAGMA foreign_keys = ON";
const FOREIGN_KEY_CHECK: &str = "PRAGMA foreign_key_check";

/// SQL executor for running migration scripts
pub struct SqlExecutor<'a> {
    connector: &'a dyn Connector,
    ctx: &'a OpContext,
}

impl<'a> SqlExecutor<'a> {
    /// Create a new SQL executor
    pub fn new(connector: &'a dyn Connector, ctx: &'a OpContext) -> Self {
        Self { connector, ctx }
    }

    /// Apply statements in order, stopping at the first failure
    pub async fn apply(&self, statements: &[String], options: ApplyOptions) -> MigrationOutcome {
        let engine = self.connector.engine();

        let outcome = if options.dry_run {
            for (i, sql) in statements.iter().enumerate() {
                tracing::info!(statement_number = i + 1, sql = %sql, "Migration SQL (dry run)");
            }
            MigrationOutcome {
                dry_run: true,
                ..Default::default()
            }
        } else {
            let transactional = options.transactional && engine.transactional_ddl();
            if options.transactional && !transactional {
                tracing::warn!(%engine, "Engine commits DDL implicitly; applying statements one by one");
            }
            self.execute_script(statements, transactional).await
        };

        if outcome.succeeded() {
            tracing::info!(
                %engine,
                statements = outcome.applied_count,
                dry_run = outcome.dry_run,
                "Migration applied"
            );
        } else {
            tracing::error!(
                %engine,
                applied = outcome.applied_count,
                remaining = outcome.remaining.len(),
                rolled_back = outcome.rolled_back,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Migration failed"
            );
        }
        outcome
    }

    /// Apply a plan and attribute the result to its diff items
    pub async fn apply_plan(&self, plan: &MigrationPlan, options: ApplyOptions) -> PlanOutcome {
        let outcome = self.apply(&plan.sql(), options).await;
        if outcome.dry_run {
            return PlanOutcome {
                outcome,
                ..Default::default()
            };
        }

        let applied = if outcome.rolled_back { 0 } else { outcome.applied_count };
        // the failed statement sits right before the unexecuted tail
        let failed_item = outcome
            .failed_statement
            .as_ref()
            .and_then(|_| plan.len().checked_sub(outcome.remaining.len() + 1))
            .and_then(|position| plan.statements.get(position))
            .map(|s| s.item_index);

        let mut unfinished: BTreeSet<usize> = plan.statements[applied.min(plan.len())..]
            .iter()
            .map(|s| s.item_index)
            .collect();
        if let Some(item) = failed_item {
            unfinished.insert(item);
        }
        let mut completed_items = Vec::new();
        for statement in &plan.statements {
            let item = statement.item_index;
            if !unfinished.contains(&item) && !completed_items.contains(&item) {
                completed_items.push(item);
            }
        }

        PlanOutcome {
            outcome,
            completed_items,
            failed_item,
        }
    }

    /// Run the script on one pinned session.
    ///
    /// On SQLite, foreign key enforcement is switched off for the session before the
    /// script starts (the pragma is a no-op inside a transaction) so rebuilding a
    /// referenced table does not fire `ON DELETE` actions. References are verified
    /// with `foreign_key_check` before the script counts as applied.
    async fn execute_script(
        &self,
        statements: &[String],
        transactional: bool,
    ) -> MigrationOutcome {
        let mut session = match self
            .ctx
            .run("migration session", self.connector.session())
            .await
        {
            Ok(session) => session,
            Err(e) => return not_started(statements, e),
        };

        let suspend_foreign_keys = self.connector.engine() == Engine::Sqlite;
        if suspend_foreign_keys {
            if let Err(e) = session.execute(FOREIGN_KEYS_OFF).await {
                return not_started(statements, e);
            }
        }

        let outcome = if transactional {
            self.execute_in_transaction(session.as_mut(), statements, suspend_foreign_keys)
                .await
        } else {
            self.execute_batch(session.as_mut(), statements, suspend_foreign_keys)
                .await
        };

        if suspend_foreign_keys {
            if let Err(e) = session.execute(FOREIGN_KEYS_ON).await {
                tracing::warn!(error = %e, "Could not re-enable foreign key enforcement");
            }
        }
        outcome
    }

    /// Execute statements one at a time
    async fn execute_batch(
        &self,
        session: &mut dyn Session,
        statements: &[String],
        check_foreign_keys: bool,
    ) -> MigrationOutcome {
        let mut outcome = self.run_statements(session, statements).await;
        if check_foreign_keys && outcome.succeeded() {
            if let Err(e) = self.check_foreign_keys(session).await {
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }

    /// Execute statements in a single transaction
    async fn execute_in_transaction(
        &self,
        session: &mut dyn Session,
        statements: &[String],
        check_foreign_keys: bool,
    ) -> MigrationOutcome {
        if let Err(e) = session.execute("BEGIN").await {
            return not_started(statements, e);
        }

        let mut outcome = self.run_statements(session, statements).await;
        if check_foreign_keys && outcome.succeeded() {
            if let Err(e) = self.check_foreign_keys(session).await {
                outcome.error = Some(e.to_string());
            }
        }
        if outcome.succeeded() {
            match session.execute("COMMIT").await {
                Ok(_) => return outcome,
                Err(e) => outcome.error = Some(e.to_string()),
            }
        }

        if let Err(e) = session.execute("ROLLBACK").await {
            tracing::warn!(error = %e, "Rollback failed");
        }
        if outcome.failed_statement.is_none() {
            outcome.remaining = statements.to_vec();
        }
        outcome.applied_count = 0;
        outcome.rolled_back = true;
        outcome
    }

    /// Run statements in order on `session`, stopping at the first failure
    async fn run_statements(
        &self,
        session: &mut dyn Session,
        statements: &[String],
    ) -> MigrationOutcome {
        let mut outcome = MigrationOutcome::default();

        for (index, sql) in statements.iter().enumerate() {
            match self
                .ctx
                .run("migration statement", session.execute(sql))
                .await
            {
                Ok(_) => outcome.applied_count += 1,
                Err(Error::Cancelled(op)) => {
                    outcome.error = Some(Error::Cancelled(op).to_string());
                    outcome.remaining = statements[index..].to_vec();
                    break;
                }
                Err(e) => {
                    outcome.failed_statement = Some(sql.clone());
                    outcome.error = Some(e.to_string());
                    outcome.remaining = statements[index + 1..].to_vec();
                    break;
                }
            }
        }
        outcome
    }

    /// Fail when any row references a missing parent
    async fn check_foreign_keys(&self, session: &mut dyn Session) -> Result<()> {
        let violations = self
            .ctx
            .run("foreign key check", session.query(FOREIGN_KEY_CHECK))
            .await?;
        match violations.first() {
            None => Ok(()),
            Some(row) => {
                let column = |i: usize| row.get(i).map(|v| v.to_string()).unwrap_or_default();
                Err(Error::Database(format!(
                    "{} row(s) violate foreign keys, first in '{}' referencing '{}'",
                    violations.len(),
                    column(0),
                    column(2)
                )))
            }
        }
    }
}

/// Outcome of a script that failed before its first statement
fn not_started(statements: &[String], error: Error) -> MigrationOutcome {
    MigrationOutcome {
        error: Some(error.to_string()),
        remaining: statements.to_vec(),
        ..Default::default()
    }
}

/// Apply `statements` to `target`
pub async fn apply_migration(
    target: &dyn Connector,
    statements: &[String],
    options: ApplyOptions,
    ctx: &OpContext,
) -> MigrationOutcome {
    SqlExecutor::new(target, ctx).apply(statements, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::db::connection::DatabaseConnection;

    async fn memory() -> DatabaseConnection {
        DatabaseConnection::connect(&ConnectionConfig {
            driver: "sqlite".into(),
            url: "sqlite::memory:".into(),
            schema: None,
            pool_size: None,
            timeout_seconds: None,
        })
        .await
        .unwrap()
    }

    fn script() -> Vec<String> {
        vec![
            "CREATE TABLE a (id INTEGER)".to_string(),
            "CREATE TABLE a (id INTEGER)".to_string(),
            "CREATE TABLE b (id INTEGER)".to_string(),
        ]
    }

    #[tokio::test]
    async fn transactional_failure_rolls_everything_back() {
        let conn = memory().await;
        let ctx = OpContext::default();
        let outcome = apply_migration(
            &conn,
            &script(),
            ApplyOptions {
                transactional: true,
                dry_run: false,
            },
            &ctx,
        )
        .await;

        assert!(outcome.rolled_back);
        assert_eq!(outcome.applied_count, 0);
        assert_eq!(outcome.remaining, vec!["CREATE TABLE b (id INTEGER)".to_string()]);
        let tables = conn.get_tables("main").await.unwrap();
        assert!(tables.is_empty());
    }

    #[tokio::test]
    async fn dangling_reference_rolls_back_the_script() {
        let conn = memory().await;
        conn.execute("CREATE TABLE parent (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        let ctx = OpContext::default();
        let script = vec![
            "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent (id))"
                .to_string(),
            "INSERT INTO child (id, parent_id) VALUES (1, 99)".to_string(),
        ];
        let outcome = apply_migration(
            &conn,
            &script,
            ApplyOptions {
                transactional: true,
                dry_run: false,
            },
            &ctx,
        )
        .await;

        assert!(outcome.rolled_back);
        assert_eq!(outcome.failed_statement, None);
        assert!(outcome.error.unwrap_or_default().contains("foreign keys"));
        let tables: Vec<String> = conn
            .get_tables("main")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(tables, vec!["parent".to_string()]);

        let rows = conn.query("PRAGMA foreign_keys", &[]).await.unwrap();
        assert_eq!(rows[0].get(0), Some(&crate::db::connector::Value::Int(1)));
    }

    #[tokio::test]
    async fn dry_run_executes_nothing() {
        let conn = memory().await;
        let ctx = OpContext::default();
        let outcome = apply_migration(
            &conn,
            &script(),
            ApplyOptions {
                transactional: false,
                dry_run: true,
            },
            &ctx,
        )
        .await;

        assert!(outcome.dry_run);
        assert!(outcome.succeeded());
        assert!(conn.get_tables("main").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_context_issues_no_statements() {
        let conn = memory().await;
        let ctx = OpContext::default();
        ctx.cancel();
        let outcome = apply_migration(&conn, &script(), ApplyOptions::default(), &ctx).await;

        assert_eq!(outcome.applied_count, 0);
        assert_eq!(outcome.failed_statement, None);
        assert_eq!(outcome.remaining.len(), 3);
        assert!(conn.get_tables("main").await.unwrap().is_empty());
    }
}
