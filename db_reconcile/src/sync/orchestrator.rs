//! Instance group checks: one source against many targets

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::db::connector::Connector;
use crate::db::context::OpContext;
use crate::error::{Error, Result};
use crate::schema::analyzer::SchemaAnalyzer;
use crate::schema::cache::SnapshotCache;
use crate::schema::diff::SchemaDiff;
use crate::schema::types::SchemaSnapshot;
use crate::sync::reconcile::{get_table_row_counts, sync_table_data};
use crate::sync::types::{SchemaScope, SyncOptions, SyncResult};

/// A named connection taking part in a group
#[derive(Clone, Copy)]
pub struct Member<'a> {
    pub name: &'a str,
    /// The live connector, or why it could not be opened
    pub connector: std::result::Result<&'a dyn Connector, &'a Error>,
    pub schema: Option<&'a str>,
}

impl<'a> Member<'a> {
    pub fn new(name: &'a str, connector: &'a dyn Connector, schema: Option<&'a str>) -> Self {
        Self {
            name,
            connector: Ok(connector),
            schema,
        }
    }

    /// A member whose connection failed; only its own checks report the error
    pub fn unreachable(name: &'a str, error: &'a Error, schema: Option<&'a str>) -> Self {
        Self {
            name,
            connector: Err(error),
            schema,
        }
    }

    fn connector(&self) -> Result<&'a dyn Connector> {
        self.connector.map_err(|e| match e {
            Error::Connection { message, transient } => Error::Connection {
                message: message.clone(),
                transient: *transient,
            },
            other => Error::fatal(other.to_string()),
        })
    }
}

/// What a status check compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChecks {
    pub schema: bool,
    pub row_counts: bool,
}

impl Default for GroupChecks {
    fn default() -> Self {
        Self {
            schema: true,
            row_counts: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    InSync,
    OutOfSync,
    Error,
    /// Never checked, e.g. cancelled before its turn
    Unchecked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub target: String,
    pub status: TargetState,
    pub diff_items: usize,
    pub tables_out_of_sync: Vec<String>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl TargetStatus {
    fn new(target: &str, status: TargetState) -> Self {
        Self {
            target: target.to_string(),
            status,
            diff_items: 0,
            tables_out_of_sync: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }
}

/// Per-target status of an instance group, in target order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSyncStatus {
    pub source: String,
    pub targets: Vec<TargetStatus>,
    pub checked_at: DateTime<Utc>,
}

impl GroupSyncStatus {
    pub fn all_in_sync(&self) -> bool {
        self.targets.iter().all(|t| t.status == TargetState::InSync)
    }

    pub fn count(&self, state: TargetState) -> usize {
        self.targets.iter().filter(|t| t.status == state).count()
    }
}

/// Sync outcome of one target in a group table sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSync {
    pub target: String,
    pub status: TargetState,
    pub result: Option<SyncResult>,
    pub error: Option<String>,
}

async fn snapshot(
    member: &Member<'_>,
    cache: Option<&SnapshotCache>,
    ctx: &OpContext,
) -> Result<Arc<SchemaSnapshot>> {
    let analyzer = SchemaAnalyzer::new(member.connector()?, ctx);
    match cache {
        Some(cache) => {
            let schema = analyzer.resolve_schema(member.schema).await?;
            cache
                .get_or_load(member.name, &schema, analyzer.analyze(Some(&schema)))
                .await
        }
        None => Ok(Arc::new(analyzer.analyze(member.schema).await?)),
    }
}

async fn check_target(
    source: &Member<'_>,
    source_snapshot: Option<&SchemaSnapshot>,
    target: &Member<'_>,
    checks: GroupChecks,
    cache: Option<&SnapshotCache>,
    ctx: &OpContext,
) -> Result<TargetStatus> {
    let mut status = TargetStatus::new(target.name, TargetState::InSync);
    let mut tables = BTreeSet::new();

    if let Some(source_snapshot) = source_snapshot {
        let target_snapshot = snapshot(target, cache, ctx).await?;
        let diff = SchemaDiff::generate(source_snapshot, &target_snapshot);
        status.diff_items = diff.items.len();
        status.warnings.extend(diff.warnings.iter().cloned());
        tables.extend(diff.tables().into_iter().map(str::to_string));
    }

    if checks.row_counts {
        let scope = SchemaScope::new(source.schema, target.schema);
        let counts =
            get_table_row_counts(source.connector()?, target.connector()?, &scope, ctx).await?;
        tables.extend(
            counts
                .into_iter()
                .filter(|c| !c.in_sync())
                .map(|c| c.table),
        );
    }

    status.tables_out_of_sync = tables.into_iter().collect();
    if status.diff_items > 0 || !status.tables_out_of_sync.is_empty() {
        status.status = TargetState::OutOfSync;
    }
    Ok(status)
}

/// Check every target against the source, at most `max_concurrent` at a time.
///
/// A failing target is reported as `error` and never affects the others. When `ctx` is
/// cancelled, targets not yet started come back `unchecked`.
pub async fn get_group_sync_status(
    source: Member<'_>,
    targets: &[Member<'_>],
    checks: GroupChecks,
    max_concurrent: usize,
    cache: Option<&SnapshotCache>,
    ctx: &OpContext,
) -> GroupSyncStatus {
    let checked_at = Utc::now();

    let source_snapshot = if checks.schema {
        match snapshot(&source, cache, ctx).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                let cancelled = matches!(e, Error::Cancelled(_));
                if !cancelled {
                    tracing::error!(source = source.name, error = %e, "Source introspection failed");
                }
                let targets = targets
                    .iter()
                    .map(|t| {
                        if cancelled {
                            return TargetStatus::new(t.name, TargetState::Unchecked);
                        }
                        let mut status = TargetStatus::new(t.name, TargetState::Error);
                        status.error = Some(format!("source '{}': {}", source.name, e));
                        status
                    })
                    .collect();
                return GroupSyncStatus {
                    source: source.name.to_string(),
                    targets,
                    checked_at,
                };
            }
        }
    } else {
        None
    };

    let mut results: Vec<(usize, TargetStatus)> = stream::iter(targets.iter().enumerate())
        .map(|(position, target)| {
            let source = &source;
            let source_snapshot = source_snapshot.as_deref();
            async move {
                if ctx.is_cancelled() {
                    return (position, TargetStatus::new(target.name, TargetState::Unchecked));
                }
                let task_ctx = ctx.child();
                let status =
                    match check_target(source, source_snapshot, target, checks, cache, &task_ctx).await {
                        Ok(status) => status,
                        Err(Error::Cancelled(_)) => TargetStatus::new(target.name, TargetState::Unchecked),
                        Err(e) => {
                            tracing::warn!(target_name = target.name, error = %e, "Target check failed");
                            let mut status = TargetStatus::new(target.name, TargetState::Error);
                            status.error = Some(e.to_string());
                            status
                        }
                    };
                (position, status)
            }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    results.sort_by_key(|(position, _)| *position);
    let status = GroupSyncStatus {
        source: source.name.to_string(),
        targets: results.into_iter().map(|(_, status)| status).collect(),
        checked_at,
    };

    tracing::info!(
        source = source.name,
        targets = status.targets.len(),
        in_sync = status.count(TargetState::InSync),
        out_of_sync = status.count(TargetState::OutOfSync),
        errors = status.count(TargetState::Error),
        "Group status checked"
    );
    status
}

/// Reconcile one table on every target from the source
pub async fn sync_group_table(
    source: Member<'_>,
    targets: &[Member<'_>],
    table: &str,
    options: &SyncOptions,
    max_concurrent: usize,
    ctx: &OpContext,
) -> Vec<TargetSync> {
    let mut results: Vec<(usize, TargetSync)> = stream::iter(targets.iter().enumerate())
        .map(|(position, target)| {
            let source = &source;
            async move {
                let unchecked = TargetSync {
                    target: target.name.to_string(),
                    status: TargetState::Unchecked,
                    result: None,
                    error: None,
                };
                if ctx.is_cancelled() {
                    return (position, unchecked);
                }
                let scope = SchemaScope::new(source.schema, target.schema);
                let outcome = match (source.connector(), target.connector()) {
                    (Ok(source_conn), Ok(target_conn)) => {
                        let task_ctx = ctx.child();
                        sync_table_data(source_conn, target_conn, &scope, table, options, &task_ctx)
                            .await
                    }
                    (Err(e), _) => Err(Error::fatal(format!("source '{}': {}", source.name, e))),
                    (_, Err(e)) => Err(e),
                };
                let sync = match outcome {
                    Ok(result) => TargetSync {
                        status: if result.is_partial() {
                            TargetState::Error
                        } else {
                            TargetState::InSync
                        },
                        result: Some(result),
                        ..unchecked
                    },
                    Err(Error::Cancelled(_)) => unchecked,
                    Err(e) => TargetSync {
                        status: TargetState::Error,
                        error: Some(e.to_string()),
                        ..unchecked
                    },
                };
                (position, sync)
            }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    results.sort_by_key(|(position, _)| *position);
    results.into_iter().map(|(_, sync)| sync).collect()
}
