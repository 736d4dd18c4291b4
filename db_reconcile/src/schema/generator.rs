//! Migration generator
//!
//! This module orders the DDL carried by a [`SchemaDiff`] into one executable script.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::schema::diff::{DiffKind, SchemaDiff, SchemaObject};
use crate::schema::types::Phase;

/// A statement of the final script together with the diff item it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStatement {
    pub sql: String,
    pub phase: Phase,
    /// Position of the originating item in `SchemaDiff::items`
    pub item_index: usize,
    pub kind: DiffKind,
    pub table: String,
}

/// Ordered migration script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub statements: Vec<PlannedStatement>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// The script as plain SQL strings
    pub fn sql(&self) -> Vec<String> {
        self.statements.iter().map(|s| s.sql.clone()).collect()
    }

    /// Statements grouped by originating item, items in order of first appearance
    pub fn batches(&self) -> Vec<(usize, Vec<&PlannedStatement>)> {
        let mut batches: Vec<(usize, Vec<&PlannedStatement>)> = Vec::new();
        for statement in &self.statements {
            match batches.iter_mut().find(|(item, _)| *item == statement.item_index) {
                Some((_, batch)) => batch.push(statement),
                None => batches.push((statement.item_index, vec![statement])),
            }
        }
        batches
    }
}

/// Migration SQL generator
pub struct MigrationGenerator<'a> {
    diff: &'a SchemaDiff,
}

impl<'a> MigrationGenerator<'a> {
    /// Create a new migration generator
    pub fn new(diff: &'a SchemaDiff) -> Self {
        Self { diff }
    }

    /// Order every item's statements by phase.
    ///
    /// Within a phase, created tables follow FK dependencies (referenced first) and
    /// dropped tables the reverse; everything else keeps diff order. Statements of one
    /// item keep their relative order.
    pub fn plan(&self) -> MigrationPlan {
        let create_rank = self.dependency_rank(DiffKind::TableAdded);
        let drop_rank = self.dependency_rank(DiffKind::TableRemoved);

        let mut keyed = Vec::new();
        for (item_index, item) in self.diff.items.iter().enumerate() {
            let rank = match item.kind {
                DiffKind::TableAdded => create_rank.get(&item_index).copied().unwrap_or(0),
                // referencing tables go first
                DiffKind::TableRemoved => usize::MAX - drop_rank.get(&item_index).copied().unwrap_or(0),
                _ => 0,
            };
            for (position, statement) in item.migration_sql.iter().enumerate() {
                keyed.push((
                    (statement.phase, rank, item_index, position),
                    PlannedStatement {
                        sql: statement.sql.clone(),
                        phase: statement.phase,
                        item_index,
                        kind: item.kind,
                        table: item.table.clone(),
                    },
                ));
            }
        }

        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        MigrationPlan {
            statements: keyed.into_iter().map(|(_, statement)| statement).collect(),
        }
    }

    /// Generate migration SQL from a schema diff
    pub fn generate_migration_sql(&self) -> Vec<String> {
        self.plan().sql()
    }

    /// Topological position of each table item of `kind`, referenced tables first.
    ///
    /// Ties and cycles resolve alphabetically; self references are ignored.
    fn dependency_rank(&self, kind: DiffKind) -> BTreeMap<usize, usize> {
        let tables: BTreeMap<String, (usize, BTreeSet<String>)> = self
            .diff
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.kind == kind)
            .filter_map(|(index, item)| {
                let table = match (&item.after, &item.before) {
                    (Some(SchemaObject::Table(t)), _) | (None, Some(SchemaObject::Table(t))) => t,
                    _ => return None,
                };
                let references = table
                    .foreign_keys
                    .iter()
                    .map(|fk| fk.ref_table.to_lowercase())
                    .filter(|r| *r != table.name.to_lowercase())
                    .collect();
                Some((table.name.to_lowercase(), (index, references)))
            })
            .collect();

        let mut ranks = BTreeMap::new();
        let mut placed: BTreeSet<String> = BTreeSet::new();
        while placed.len() < tables.len() {
            let ready: Vec<&String> = tables
                .iter()
                .filter(|(name, _)| !placed.contains(*name))
                .filter(|(_, (_, refs))| {
                    refs.iter()
                        .all(|r| placed.contains(r) || !tables.contains_key(r))
                })
                .map(|(name, _)| name)
                .collect();

            // a cycle: take the alphabetically first remaining table
            let next: Vec<&String> = if ready.is_empty() {
                tables
                    .keys()
                    .filter(|name| !placed.contains(*name))
                    .take(1)
                    .collect()
            } else {
                ready
            };

            for name in next {
                if let Some((index, _)) = tables.get(name) {
                    ranks.insert(*index, placed.len());
                }
                placed.insert(name.clone());
            }
        }
        ranks
    }
}

/// Ordered SQL script for a diff
pub fn generate_migration_sql(diff: &SchemaDiff) -> Vec<String> {
    MigrationGenerator::new(diff).generate_migration_sql()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::engine::Engine;
    use crate::schema::types::{
        ColumnDef, ForeignKeyDef, LogicalType, PrimaryKey, ReferentialAction, SchemaSnapshot,
        TableDef,
    };

    fn table(name: &str, references: &[&str]) -> TableDef {
        let mut table = TableDef::new(name);
        table
            .columns
            .push(ColumnDef::new("id", LogicalType::Integer).nullable(false));
        table.primary_key = Some(PrimaryKey {
            name: None,
            columns: vec!["id".into()],
        });
        for parent in references {
            let column = format!("{}_id", parent);
            table
                .columns
                .push(ColumnDef::new(&column, LogicalType::Integer));
            table.foreign_keys.push(ForeignKeyDef {
                name: format!("fk_{}_{}", name, parent),
                columns: vec![column],
                ref_table: parent.to_string(),
                ref_columns: vec!["id".into()],
                on_delete: ReferentialAction::NoAction,
                on_update: ReferentialAction::NoAction,
            });
        }
        table
    }

    fn snapshot(tables: Vec<TableDef>) -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot::new(Engine::Postgres, "public");
        snapshot.tables = tables;
        snapshot
    }

    fn position(script: &[String], needle: &str) -> usize {
        script
            .iter()
            .position(|s| s.contains(needle))
            .unwrap_or_else(|| panic!("no statement contains {needle}"))
    }

    #[test]
    fn creates_referenced_tables_first() {
        // alphabetical order would put "accounts" before "users"
        let source = snapshot(vec![
            table("accounts", &["users"]),
            table("line_items", &["accounts", "products"]),
            table("products", &[]),
            table("users", &[]),
        ]);
        let diff = SchemaDiff::generate(&source, &snapshot(vec![]));
        let script = generate_migration_sql(&diff);

        assert!(position(&script, "CREATE TABLE users") < position(&script, "CREATE TABLE accounts"));
        assert!(
            position(&script, "CREATE TABLE accounts") < position(&script, "CREATE TABLE line_items")
        );
        let last_create = script
            .iter()
            .rposition(|s| s.starts_with("CREATE TABLE"))
            .unwrap();
        let first_fk = script
            .iter()
            .position(|s| s.contains("FOREIGN KEY"))
            .unwrap();
        assert!(last_create < first_fk);
    }

    #[test]
    fn drops_foreign_keys_before_tables() {
        let target = snapshot(vec![table("orders", &["users"]), table("users", &[])]);
        let diff = SchemaDiff::generate(&snapshot(vec![]), &target);
        let script = generate_migration_sql(&diff);

        assert_eq!(
            script,
            vec![
                "ALTER TABLE orders DROP CONSTRAINT fk_orders_users".to_string(),
                "DROP TABLE orders".to_string(),
                "DROP TABLE users".to_string(),
            ]
        );
    }

    #[test]
    fn batches_group_by_item() {
        let source = snapshot(vec![table("orders", &["users"]), table("users", &[])]);
        let plan = MigrationGenerator::new(&SchemaDiff::generate(&source, &snapshot(vec![]))).plan();
        let batches = plan.batches();

        assert_eq!(batches.len(), 2);
        let statements: usize = batches.iter().map(|(_, b)| b.len()).sum();
        assert_eq!(statements, plan.len());
    }
}
