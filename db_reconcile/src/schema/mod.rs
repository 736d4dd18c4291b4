//! Schema module for db_reconcile
//!
//! This module handles schema introspection, comparison and migration synthesis.

pub mod analyzer;
pub mod cache;
pub mod dialect;
pub mod diff;
pub mod generator;
pub mod normalize;
pub mod types;

// Re-export key types
pub use analyzer::SchemaAnalyzer;
pub use cache::SnapshotCache;
pub use dialect::Dialect;
pub use diff::{DiffItem, DiffKind, DiffSummary, SchemaDiff, SchemaObject};
pub use generator::{generate_migration_sql, MigrationGenerator, MigrationPlan, PlannedStatement};
pub use types::{
    ColumnDef, ForeignKeyDef, IndexDef, LogicalType, MigrationStatement, Phase, PrimaryKey,
    ReferentialAction, SchemaSnapshot, TableDef,
};

use crate::db::connector::Connector;
use crate::db::context::OpContext;
use crate::error::Result;

/// Introspect both sides and diff them; `source` is the desired state
pub async fn compare_schemas(
    source: &dyn Connector,
    target: &dyn Connector,
    source_schema: Option<&str>,
    target_schema: Option<&str>,
    ctx: &OpContext,
) -> Result<SchemaDiff> {
    let source_analyzer = SchemaAnalyzer::new(source, ctx);
    let target_analyzer = SchemaAnalyzer::new(target, ctx);
    let (source_snapshot, target_snapshot) = tokio::try_join!(
        source_analyzer.analyze(source_schema),
        target_analyzer.analyze(target_schema),
    )?;

    let diff = SchemaDiff::generate(&source_snapshot, &target_snapshot);
    tracing::info!(
        source_engine = %source_snapshot.engine,
        target_engine = %target_snapshot.engine,
        items = diff.items.len(),
        warnings = diff.warnings.len(),
        "Schema comparison complete"
    );
    Ok(diff)
}
