//! db_reconcile: schema comparison, migration synthesis and row reconciliation
//!
//! db_reconcile introspects PostgreSQL, MySQL, MariaDB and SQLite schemas into one
//! normalized model, diffs them, renders the DDL that brings a target in line with a
//! source, and reconciles table rows between instances.

pub mod config;
pub mod db;
pub mod error;
pub mod schema;
pub mod sync;
pub mod utils;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

// Re-export main types for easier access
pub use config::Config;
pub use db::connection::DatabaseConnection;
pub use db::connector::{ConnectionTest, Connector, Session};
pub use db::context::OpContext;
pub use db::executor::{apply_migration, ApplyOptions, MigrationOutcome, PlanOutcome, SqlExecutor};
pub use error::{Error, Result};
pub use schema::analyzer::SchemaAnalyzer;
pub use schema::diff::SchemaDiff;
pub use schema::generator::{generate_migration_sql, MigrationGenerator, MigrationPlan};
pub use schema::{compare_schemas, SnapshotCache};
pub use sync::{
    get_group_sync_status, get_table_row_counts, sync_table_data, GroupChecks, GroupSyncStatus,
    RowDiff, SchemaScope, SyncOptions, SyncResult, TargetSync,
};

use crate::sync::Member;

/// A group member's name and its connection, or the error opening it
type GroupConnection = (String, Result<Arc<DatabaseConnection>>);

/// Initialize a client with the specified configuration file
pub async fn init(config_path: &str) -> Result<ReconcileClient> {
    let config = config::load_from_file(config_path)?;
    Ok(ReconcileClient::new(config))
}

/// The main client: resolves configured connection names and owns the snapshot cache
pub struct ReconcileClient {
    config: Config,
    connections: Mutex<HashMap<String, Arc<DatabaseConnection>>>,
    cache: SnapshotCache,
    ctx: OpContext,
}

impl ReconcileClient {
    /// Create a new client from configuration; connections open on first use
    pub fn new(config: Config) -> Self {
        let cache = SnapshotCache::new(Duration::from_secs(config.cache.ttl_seconds));
        let ctx = OpContext::with_timeout(config.engine.statement_timeout());
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
            cache,
            ctx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Context every operation of this client runs under
    pub fn context(&self) -> &OpContext {
        &self.ctx
    }

    /// Cancel in-flight and future operations of this client
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Open (or reuse) the named connection
    pub async fn connection(&self, name: &str) -> Result<Arc<DatabaseConnection>> {
        let mut connections = self.connections.lock().await;
        if let Some(conn) = connections.get(name) {
            if conn.is_connected() {
                return Ok(Arc::clone(conn));
            }
        }
        let config = self.config.connection(name)?;
        let conn = Arc::new(DatabaseConnection::connect(config).await?);
        tracing::info!(connection = name, engine = %conn.engine(), "Connection opened");
        connections.insert(name.to_string(), Arc::clone(&conn));
        Ok(conn)
    }

    fn schema_of(&self, name: &str) -> Option<&str> {
        self.config
            .connections
            .get(name)
            .and_then(|c| c.schema.as_deref())
    }

    fn scope(&self, source: &str, target: &str) -> SchemaScope {
        SchemaScope::new(self.schema_of(source), self.schema_of(target))
    }

    async fn snapshot(&self, name: &str) -> Result<Arc<schema::types::SchemaSnapshot>> {
        let conn = self.connection(name).await?;
        let analyzer = SchemaAnalyzer::new(conn.as_ref(), &self.ctx);
        let schema = analyzer.resolve_schema(self.schema_of(name)).await?;
        self.cache
            .get_or_load(name, &schema, analyzer.analyze(Some(&schema)))
            .await
    }

    /// Diff two configured connections; `source` is the desired state
    pub async fn compare_schemas(&self, source: &str, target: &str) -> Result<SchemaDiff> {
        let (source_snapshot, target_snapshot) =
            tokio::try_join!(self.snapshot(source), self.snapshot(target))?;
        let diff = SchemaDiff::generate(&source_snapshot, &target_snapshot);
        tracing::info!(
            source,
            target,
            items = diff.items.len(),
            warnings = diff.warnings.len(),
            "Schema comparison complete"
        );
        Ok(diff)
    }

    /// Ordered migration plan for a diff
    pub fn generate_migrations(&self, diff: &SchemaDiff) -> MigrationPlan {
        MigrationGenerator::new(diff).plan()
    }

    /// Apply statements to `target` with the configured migration options
    pub async fn apply_migration(
        &self,
        target: &str,
        statements: &[String],
    ) -> Result<MigrationOutcome> {
        let conn = self.connection(target).await?;
        let outcome = SqlExecutor::new(conn.as_ref(), &self.ctx)
            .apply(statements, self.apply_options())
            .await;
        if !outcome.dry_run {
            self.cache.invalidate_connection(target).await;
        }
        Ok(outcome)
    }

    /// Apply a plan to `target`, reporting completion per diff item
    pub async fn apply_plan(&self, target: &str, plan: &MigrationPlan) -> Result<PlanOutcome> {
        let conn = self.connection(target).await?;
        let outcome = SqlExecutor::new(conn.as_ref(), &self.ctx)
            .apply_plan(plan, self.apply_options())
            .await;
        if !outcome.outcome.dry_run {
            self.cache.invalidate_connection(target).await;
        }
        Ok(outcome)
    }

    fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            transactional: self.config.migrations.transactional,
            dry_run: self.config.migrations.dry_run,
        }
    }

    pub async fn get_table_row_counts(&self, source: &str, target: &str) -> Result<Vec<RowDiff>> {
        let (source_conn, target_conn) =
            tokio::try_join!(self.connection(source), self.connection(target))?;
        get_table_row_counts(
            source_conn.as_ref(),
            target_conn.as_ref(),
            &self.scope(source, target),
            &self.ctx,
        )
        .await
    }

    /// Reconcile one table; the batch size defaults to `engine.batch_size`
    pub async fn sync_table_data(
        &self,
        source: &str,
        target: &str,
        table: &str,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        let (source_conn, target_conn) =
            tokio::try_join!(self.connection(source), self.connection(target))?;
        let options = self.with_batch_size(options);
        let result = sync_table_data(
            source_conn.as_ref(),
            target_conn.as_ref(),
            &self.scope(source, target),
            table,
            &options,
            &self.ctx,
        )
        .await;
        self.cache.invalidate_connection(target).await;
        result
    }

    fn with_batch_size(&self, options: &SyncOptions) -> SyncOptions {
        let mut options = options.clone();
        options.batch_size = options.batch_size.or(Some(self.config.engine.batch_size));
        options
    }

    /// Resolve every member of a group, source first.
    ///
    /// A member that cannot be reached keeps its error so only its own result fails;
    /// configuration problems still fail the whole call.
    async fn group_connections(&self, group: &str) -> Result<Vec<GroupConnection>> {
        let group = self.config.group(group)?.clone();
        let mut members = Vec::with_capacity(group.targets.len() + 1);
        for name in std::iter::once(&group.source).chain(group.targets.iter()) {
            let conn = match self.connection(name).await {
                Ok(conn) => Ok(conn),
                Err(e @ Error::Configuration(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(connection = %name, error = %e, "Group member unreachable");
                    Err(e)
                }
            };
            members.push((name.clone(), conn));
        }
        Ok(members)
    }

    fn members<'a>(&'a self, connections: &'a [GroupConnection]) -> Vec<Member<'a>> {
        connections
            .iter()
            .map(|(name, conn)| {
                let schema = self.schema_of(name);
                match conn {
                    Ok(conn) => Member::new(name, conn.as_ref(), schema),
                    Err(e) => Member::unreachable(name, e, schema),
                }
            })
            .collect()
    }

    /// Schema and row count status of every target in a group
    pub async fn get_group_sync_status(
        &self,
        group: &str,
        checks: GroupChecks,
    ) -> Result<GroupSyncStatus> {
        let connections = self.group_connections(group).await?;
        let members = self.members(&connections);
        let Some((source, targets)) = members.split_first() else {
            return Err(Error::Configuration(format!("group '{}' is empty", group)));
        };
        Ok(get_group_sync_status(
            *source,
            targets,
            checks,
            self.config.engine.max_concurrent_targets,
            Some(&self.cache),
            &self.ctx,
        )
        .await)
    }

    /// Reconcile one table on every target of a group
    pub async fn sync_group_table(
        &self,
        group: &str,
        table: &str,
        options: &SyncOptions,
    ) -> Result<Vec<TargetSync>> {
        options.validate()?;
        let connections = self.group_connections(group).await?;
        let members = self.members(&connections);
        let Some((source, targets)) = members.split_first() else {
            return Err(Error::Configuration(format!("group '{}' is empty", group)));
        };
        let options = self.with_batch_size(options);
        let results = sync::sync_group_table(
            *source,
            targets,
            table,
            &options,
            self.config.engine.max_concurrent_targets,
            &self.ctx,
        )
        .await;
        for target in targets {
            self.cache.invalidate_connection(target.name).await;
        }
        Ok(results)
    }

    pub async fn test_connection(&self, name: &str) -> ConnectionTest {
        match self.connection(name).await {
            Ok(conn) => conn.test_connection().await,
            Err(e) => ConnectionTest {
                success: false,
                message: e.to_string(),
            },
        }
    }

    /// Close every open connection
    pub async fn disconnect_all(&self) {
        let mut connections = self.connections.lock().await;
        for (name, conn) in connections.drain() {
            conn.disconnect().await;
            tracing::debug!(connection = %name, "Connection closed");
        }
    }
}
