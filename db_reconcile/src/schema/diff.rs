//! Schema difference calculator
//!
//! This module compares two normalized snapshots and produces the ordered list of
//! changes that turns the target into the source, each with its DDL pre-rendered for the
//! target engine.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::db::engine::{CaseRules, Engine};
use crate::schema::dialect::Dialect;
use crate::schema::types::{
    ColumnDef, ForeignKeyDef, IndexDef, LogicalType, MigrationStatement, PrimaryKey,
    ReferentialAction, SchemaSnapshot, TableDef,
};

/// Note attached to items whose DDL is carried by another item's table rebuild
pub const REBUILD_NOTE: &str = "applied by table rebuild";

/// Item name used for an unnamed primary key
pub const PRIMARY_KEY_ITEM: &str = "PRIMARY KEY";

/// Category and direction of one change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    TableAdded,
    TableRemoved,
    ColumnAdded,
    ColumnRemoved,
    ColumnModified,
    IndexAdded,
    IndexRemoved,
    IndexModified,
    FkAdded,
    FkRemoved,
    FkModified,
}

/// Definition carried as `before` / `after` on a diff item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "object", content = "definition", rename_all = "snake_case")]
pub enum SchemaObject {
    Table(TableDef),
    Column(ColumnDef),
    Index(IndexDef),
    PrimaryKey(PrimaryKey),
    ForeignKey(ForeignKeyDef),
}

/// One structural difference; `before` is the target state, `after` the source state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffItem {
    pub kind: DiffKind,
    pub table: String,
    pub name: Option<String>,
    pub before: Option<SchemaObject>,
    pub after: Option<SchemaObject>,
    pub migration_sql: Vec<MigrationStatement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DiffItem {
    fn new(kind: DiffKind, table: &str, name: Option<&str>) -> Self {
        Self {
            kind,
            table: table.to_string(),
            name: name.map(str::to_string),
            before: None,
            after: None,
            migration_sql: Vec::new(),
            note: None,
        }
    }

    fn before(mut self, object: SchemaObject) -> Self {
        self.before = Some(object);
        self
    }

    fn after(mut self, object: SchemaObject) -> Self {
        self.after = Some(object);
        self
    }

    fn sql(mut self, statements: Vec<MigrationStatement>) -> Self {
        self.migration_sql = statements;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

/// Counts per object category and direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub tables: ChangeCounts,
    pub columns: ChangeCounts,
    pub indexes: ChangeCounts,
    pub foreign_keys: ChangeCounts,
}

impl DiffSummary {
    fn from_items(items: &[DiffItem]) -> Self {
        let mut summary = DiffSummary::default();
        for item in items {
            let counts = match item.kind {
                DiffKind::TableAdded | DiffKind::TableRemoved => &mut summary.tables,
                DiffKind::ColumnAdded | DiffKind::ColumnRemoved | DiffKind::ColumnModified => {
                    &mut summary.columns
                }
                DiffKind::IndexAdded | DiffKind::IndexRemoved | DiffKind::IndexModified => {
                    &mut summary.indexes
                }
                DiffKind::FkAdded | DiffKind::FkRemoved | DiffKind::FkModified => {
                    &mut summary.foreign_keys
                }
            };
            match item.kind {
                DiffKind::TableAdded
                | DiffKind::ColumnAdded
                | DiffKind::IndexAdded
                | DiffKind::FkAdded => counts.added += 1,
                DiffKind::TableRemoved
                | DiffKind::ColumnRemoved
                | DiffKind::IndexRemoved
                | DiffKind::FkRemoved => counts.removed += 1,
                DiffKind::ColumnModified | DiffKind::IndexModified | DiffKind::FkModified => {
                    counts.modified += 1
                }
            }
        }
        summary
    }
}

/// Represents changes needed to bring the target schema to the source schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDiff {
    pub items: Vec<DiffItem>,
    pub summary: DiffSummary,
    /// Introspection failures and differences that produce no DDL
    pub warnings: Vec<String>,
    pub target_engine: Engine,
    pub source_fingerprint: String,
    pub target_fingerprint: String,
}

impl SchemaDiff {
    /// Compute the diff from `target` (current state) to `source` (desired state).
    ///
    /// Pure and deterministic: the same snapshots always yield the same items in the
    /// same order.
    pub fn generate(source: &SchemaSnapshot, target: &SchemaSnapshot) -> Self {
        let differ = Differ::new(source, target);
        let (items, warnings) = differ.run();

        tracing::debug!(
            items = items.len(),
            warnings = warnings.len(),
            target_engine = %target.engine,
            "Schema diff computed"
        );

        Self {
            summary: DiffSummary::from_items(&items),
            items,
            warnings,
            target_engine: target.engine,
            source_fingerprint: source.fingerprint(),
            target_fingerprint: target.fingerprint(),
        }
    }

    /// Check if the diff is empty (no changes needed)
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Names of tables touched by the diff, in item order
    pub fn tables(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .filter(|item| seen.insert(item.table.as_str()))
            .map(|item| item.table.as_str())
            .collect()
    }
}

type ForeignKeyShape = (
    Vec<String>,
    String,
    Vec<String>,
    ReferentialAction,
    ReferentialAction,
);

struct ForeignKeyMatch<'a> {
    removed: Vec<&'a ForeignKeyDef>,
    modified: Vec<(&'a ForeignKeyDef, &'a ForeignKeyDef)>,
    added: Vec<&'a ForeignKeyDef>,
}

struct IndexMatch<'a> {
    removed: Vec<&'a IndexDef>,
    modified: Vec<(&'a IndexDef, &'a IndexDef)>,
    added: Vec<&'a IndexDef>,
}

struct Differ<'a> {
    source: &'a SchemaSnapshot,
    target: &'a SchemaSnapshot,
    rules: CaseRules,
    dialect: Dialect,
    source_tables: IndexMap<String, &'a TableDef>,
    target_tables: IndexMap<String, &'a TableDef>,
    warnings: Vec<String>,
}

impl<'a> Differ<'a> {
    fn new(source: &'a SchemaSnapshot, target: &'a SchemaSnapshot) -> Self {
        let rules = source.case_rules.combine(target.case_rules);
        let mut warnings = Vec::new();

        for (side, snapshot) in [("source", source), ("target", target)] {
            for failure in &snapshot.failures {
                warnings.push(format!(
                    "{} table '{}' skipped: {}",
                    side, failure.table, failure.message
                ));
            }
        }

        let mut index = |side: &str, snapshot: &'a SchemaSnapshot| {
            let mut tables = IndexMap::new();
            for table in &snapshot.tables {
                let key = rules.tables.key(&table.name);
                if let Some(previous) = tables.insert(key, table) {
                    warnings.push(format!(
                        "{} tables '{}' and '{}' collide under case-insensitive comparison",
                        side, previous.name, table.name
                    ));
                }
            }
            tables
        };
        let source_tables = index("source", source);
        let target_tables = index("target", target);

        Self {
            source,
            target,
            rules,
            dialect: Dialect::for_snapshot(target),
            source_tables,
            target_tables,
            warnings,
        }
    }

    fn failed(&self, name: &str) -> bool {
        let key = self.rules.tables.key(name);
        self.source
            .failures
            .iter()
            .chain(self.target.failures.iter())
            .any(|f| self.rules.tables.key(&f.table) == key)
    }

    fn run(mut self) -> (Vec<DiffItem>, Vec<String>) {
        let mut items = Vec::new();

        let mut added: Vec<&TableDef> = self
            .source_tables
            .iter()
            .filter(|(key, t)| !self.target_tables.contains_key(*key) && !self.failed(&t.name))
            .map(|(_, t)| *t)
            .collect();
        added.sort_by(|a, b| a.name.cmp(&b.name));

        for table in added {
            let desired = self.desired_table(table, None);
            items.push(
                DiffItem::new(DiffKind::TableAdded, &table.name, Some(&table.name))
                    .after(SchemaObject::Table(table.clone()))
                    .sql(self.dialect.create_table(&desired)),
            );
        }

        let mut common: Vec<(String, &TableDef, &TableDef)> = self
            .source_tables
            .iter()
            .filter_map(|(key, s)| self.target_tables.get(key).map(|t| (key.clone(), *s, *t)))
            .filter(|(_, s, _)| !self.failed(&s.name))
            .collect();
        common.sort_by(|a, b| a.0.cmp(&b.0));

        let dropped_fks = self.dropped_foreign_keys(&common);
        for (_, source_table, target_table) in common {
            let table_items = self.diff_table(source_table, target_table, &dropped_fks);
            items.extend(table_items);
        }

        let mut removed: Vec<&TableDef> = self
            .target_tables
            .iter()
            .filter(|(key, t)| !self.source_tables.contains_key(*key) && !self.failed(&t.name))
            .map(|(_, t)| *t)
            .collect();
        removed.sort_by(|a, b| a.name.cmp(&b.name));

        for table in removed {
            items.push(
                DiffItem::new(DiffKind::TableRemoved, &table.name, Some(&table.name))
                    .before(SchemaObject::Table(table.clone()))
                    .sql(self.dialect.drop_table(table)),
            );
        }

        (items, self.warnings)
    }

    /// Target FKs the diff drops anyway, keyed by (table key, constraint name)
    fn dropped_foreign_keys(
        &self,
        common: &[(String, &TableDef, &TableDef)],
    ) -> HashSet<(String, String)> {
        let mut dropped = HashSet::new();
        for (key, source_table, target_table) in common {
            let matched = self.match_foreign_keys(source_table, target_table);
            for fk in matched.removed {
                dropped.insert((key.clone(), fk.name.clone()));
            }
            for (before, _) in matched.modified {
                dropped.insert((key.clone(), before.name.clone()));
            }
        }
        for (key, table) in &self.target_tables {
            if !self.source_tables.contains_key(key) {
                for fk in &table.foreign_keys {
                    dropped.insert((key.clone(), fk.name.clone()));
                }
            }
        }
        dropped
    }

    fn column_key(&self, name: &str) -> String {
        self.rules.columns.key(name)
    }

    fn columns_key(&self, names: &[String]) -> Vec<String> {
        names.iter().map(|n| self.column_key(n)).collect()
    }

    /// Target spelling of a table name when the target already has it
    fn target_table_name(&self, name: &str) -> String {
        self.target_tables
            .get(&self.rules.tables.key(name))
            .map(|t| t.name.clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Target spelling of column names on an existing target table
    fn target_column_names(&self, names: &[String], table: Option<&TableDef>) -> Vec<String> {
        names
            .iter()
            .map(|name| {
                table
                    .and_then(|t| t.column(name, &self.rules))
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| name.clone())
            })
            .collect()
    }

    fn target_foreign_key(&self, fk: &ForeignKeyDef, owner: Option<&TableDef>) -> ForeignKeyDef {
        let referenced = self.target_tables.get(&self.rules.tables.key(&fk.ref_table)).copied();
        ForeignKeyDef {
            name: fk.name.clone(),
            columns: self.target_column_names(&fk.columns, owner),
            ref_table: self.target_table_name(&fk.ref_table),
            ref_columns: self.target_column_names(&fk.ref_columns, referenced),
            on_delete: fk.on_delete,
            on_update: fk.on_update,
        }
    }

    fn target_index(&self, index: &IndexDef, owner: Option<&TableDef>) -> IndexDef {
        IndexDef {
            columns: self.target_column_names(&index.columns, owner),
            ..index.clone()
        }
    }

    /// Source table rewritten with target spellings, ready to render
    fn desired_table(&self, source: &TableDef, existing: Option<&TableDef>) -> TableDef {
        let mut desired = source.clone();
        if let Some(existing) = existing {
            desired.name = existing.name.clone();
        }
        desired.foreign_keys = source
            .foreign_keys
            .iter()
            .map(|fk| self.target_foreign_key(fk, None))
            .collect();
        desired
    }

    fn types_equal(&self, a: &LogicalType, b: &LogicalType) -> bool {
        // SQLite stores every integer width in the same 64-bit class
        let sqlite_involved =
            self.source.engine == Engine::Sqlite || self.target.engine == Engine::Sqlite;
        a == b || (sqlite_involved && a.is_integer() && b.is_integer())
    }

    fn columns_equal(&self, source: &ColumnDef, target: &ColumnDef) -> bool {
        self.types_equal(&source.data_type, &target.data_type)
            && source.nullable == target.nullable
            && source.default == target.default
            && source.auto_increment == target.auto_increment
    }

    fn index_definition(&self, index: &IndexDef) -> (Vec<String>, bool) {
        (self.columns_key(&index.columns), index.unique)
    }

    fn fk_definition(&self, fk: &ForeignKeyDef) -> ForeignKeyShape {
        (
            self.columns_key(&fk.columns),
            self.rules.tables.key(&fk.ref_table),
            self.columns_key(&fk.ref_columns),
            fk.on_delete,
            fk.on_update,
        )
    }

    fn match_indexes<'t>(&self, source: &'t TableDef, target: &'t TableDef) -> IndexMatch<'t> {
        let mut unmatched_target: Vec<&IndexDef> = target.indexes.iter().collect();
        let mut unmatched_source = Vec::new();

        for index in &source.indexes {
            let definition = self.index_definition(index);
            match unmatched_target
                .iter()
                .position(|t| self.index_definition(t) == definition)
            {
                Some(pos) => {
                    unmatched_target.remove(pos);
                }
                None => unmatched_source.push(index),
            }
        }

        let mut modified = Vec::new();
        let mut added = Vec::new();
        for index in unmatched_source {
            match unmatched_target
                .iter()
                .position(|t| self.rules.tables.same(&t.name, &index.name))
            {
                Some(pos) => modified.push((unmatched_target.remove(pos), index)),
                None => added.push(index),
            }
        }

        IndexMatch {
            removed: unmatched_target,
            modified,
            added,
        }
    }

    fn match_foreign_keys<'t>(
        &self,
        source: &'t TableDef,
        target: &'t TableDef,
    ) -> ForeignKeyMatch<'t> {
        let mut unmatched_target: Vec<&ForeignKeyDef> = target.foreign_keys.iter().collect();
        let mut unmatched_source = Vec::new();

        for fk in &source.foreign_keys {
            let definition = self.fk_definition(fk);
            match unmatched_target
                .iter()
                .position(|t| self.fk_definition(t) == definition)
            {
                Some(pos) => {
                    unmatched_target.remove(pos);
                }
                None => unmatched_source.push(fk),
            }
        }

        let mut modified = Vec::new();
        let mut added = Vec::new();
        for fk in unmatched_source {
            match unmatched_target
                .iter()
                .position(|t| self.rules.tables.same(&t.name, &fk.name))
            {
                Some(pos) => modified.push((unmatched_target.remove(pos), fk)),
                None => added.push(fk),
            }
        }

        ForeignKeyMatch {
            removed: unmatched_target,
            modified,
            added,
        }
    }

    /// FKs MySQL needs dropped around a MODIFY COLUMN of `table.column`
    fn touching_foreign_keys(
        &self,
        table: &TableDef,
        column: &str,
        dropped: &HashSet<(String, String)>,
    ) -> Vec<(String, ForeignKeyDef)> {
        if !self.target.engine.is_mysql_family() {
            return Vec::new();
        }
        let table_key = self.rules.tables.key(&table.name);
        let column_key = self.column_key(column);
        let mut touching = Vec::new();

        for (owner_key, owner) in &self.target_tables {
            for fk in &owner.foreign_keys {
                if dropped.contains(&(owner_key.clone(), fk.name.clone())) {
                    continue;
                }
                let on_column = *owner_key == table_key
                    && fk.columns.iter().any(|c| self.column_key(c) == column_key);
                let referencing = self.rules.tables.key(&fk.ref_table) == table_key
                    && fk.ref_columns.iter().any(|c| self.column_key(c) == column_key);
                if on_column || referencing {
                    touching.push((owner.name.clone(), fk.clone()));
                }
            }
        }
        touching
    }

    fn diff_table(
        &mut self,
        source: &TableDef,
        target: &TableDef,
        dropped_fks: &HashSet<(String, String)>,
    ) -> Vec<DiffItem> {
        let table = target.name.as_str();
        let mut items = Vec::new();
        let mut sqlite_rebuild = false;
        let sqlite = self.target.engine == Engine::Sqlite;
        let target_pk = self.columns_key(target.primary_key_columns());
        let source_pk = self.columns_key(source.primary_key_columns());

        let mut modified_columns = Vec::new();
        for column in &source.columns {
            match target.column(&column.name, &self.rules) {
                None => {
                    if sqlite
                        && (!sqlite_can_add_column(column)
                            || source_pk.contains(&self.column_key(&column.name)))
                    {
                        sqlite_rebuild = true;
                    }
                    items.push(
                        DiffItem::new(DiffKind::ColumnAdded, table, Some(&column.name))
                            .after(SchemaObject::Column(column.clone()))
                            .sql(self.dialect.add_column(table, column)),
                    );
                }
                Some(existing) if !self.columns_equal(column, existing) => {
                    modified_columns.push((existing, column));
                }
                Some(_) => {}
            }
        }

        for (existing, column) in modified_columns {
            sqlite_rebuild |= sqlite;
            let desired = ColumnDef {
                name: existing.name.clone(),
                ..column.clone()
            };
            let touching = self.touching_foreign_keys(target, &existing.name, dropped_fks);
            items.push(
                DiffItem::new(DiffKind::ColumnModified, table, Some(&existing.name))
                    .before(SchemaObject::Column(existing.clone()))
                    .after(SchemaObject::Column(column.clone()))
                    .sql(self.dialect.alter_column(table, existing, &desired, &touching)),
            );
        }

        for column in &target.columns {
            if source.column(&column.name, &self.rules).is_some() {
                continue;
            }
            if sqlite {
                let key = self.column_key(&column.name);
                let constrained = target_pk.contains(&key)
                    || target
                        .foreign_keys
                        .iter()
                        .any(|fk| self.columns_key(&fk.columns).contains(&key))
                    || target
                        .indexes
                        .iter()
                        .any(|i| i.backs_constraint && self.columns_key(&i.columns).contains(&key));
                sqlite_rebuild |= constrained;
            }
            items.push(
                DiffItem::new(DiffKind::ColumnRemoved, table, Some(&column.name))
                    .before(SchemaObject::Column(column.clone()))
                    .sql(self.dialect.drop_column(table, &column.name)),
            );
        }

        let indexes = self.match_indexes(source, target);
        for index in &indexes.removed {
            sqlite_rebuild |= sqlite && index.backs_constraint;
            items.push(
                DiffItem::new(DiffKind::IndexRemoved, table, Some(&index.name))
                    .before(SchemaObject::Index((*index).clone()))
                    .sql(self.dialect.drop_index(table, index)),
            );
        }
        for (before, after) in &indexes.modified {
            sqlite_rebuild |= sqlite && before.backs_constraint;
            let mut statements = self.dialect.drop_index(table, before);
            statements.extend(
                self.dialect
                    .create_index(table, &self.target_index(after, Some(target))),
            );
            items.push(
                DiffItem::new(DiffKind::IndexModified, table, Some(&before.name))
                    .before(SchemaObject::Index((*before).clone()))
                    .after(SchemaObject::Index((*after).clone()))
                    .sql(statements),
            );
        }
        for index in &indexes.added {
            items.push(
                DiffItem::new(DiffKind::IndexAdded, table, Some(&index.name))
                    .after(SchemaObject::Index((*index).clone()))
                    .sql(
                        self.dialect
                            .create_index(table, &self.target_index(index, Some(target))),
                    ),
            );
        }

        let fks = self.match_foreign_keys(source, target);
        sqlite_rebuild |= sqlite
            && !(fks.removed.is_empty() && fks.modified.is_empty() && fks.added.is_empty());
        for fk in &fks.removed {
            items.push(
                DiffItem::new(DiffKind::FkRemoved, table, Some(&fk.name))
                    .before(SchemaObject::ForeignKey((*fk).clone()))
                    .sql(self.dialect.drop_foreign_key(table, fk)),
            );
        }
        for (before, after) in &fks.modified {
            let mut statements = self.dialect.drop_foreign_key(table, before);
            statements.extend(
                self.dialect
                    .add_foreign_key(table, &self.target_foreign_key(after, Some(target))),
            );
            items.push(
                DiffItem::new(DiffKind::FkModified, table, Some(&before.name))
                    .before(SchemaObject::ForeignKey((*before).clone()))
                    .after(SchemaObject::ForeignKey((*after).clone()))
                    .sql(statements),
            );
        }
        for fk in &fks.added {
            items.push(
                DiffItem::new(DiffKind::FkAdded, table, Some(&fk.name))
                    .after(SchemaObject::ForeignKey((*fk).clone()))
                    .sql(
                        self.dialect
                            .add_foreign_key(table, &self.target_foreign_key(fk, Some(target))),
                    ),
            );
        }

        if source_pk != target_pk {
            sqlite_rebuild |= sqlite;
            items.push(self.primary_key_item(source, target));
        }
        if sqlite_rebuild && !items.is_empty() {
            self.attach_rebuild(&mut items, source, target);
        }

        items
    }

    /// Primary key change, counted with the indexes
    fn primary_key_item(&self, source: &TableDef, target: &TableDef) -> DiffItem {
        let table = target.name.as_str();
        let mut statements = Vec::new();
        if let Some(before) = &target.primary_key {
            statements.extend(self.dialect.drop_primary_key(table, before));
        }
        if let Some(after) = &source.primary_key {
            let columns: Vec<String> = after
                .columns
                .iter()
                .map(|name| {
                    target
                        .column(name, &self.rules)
                        .map_or_else(|| name.clone(), |c| c.name.clone())
                })
                .collect();
            statements.extend(self.dialect.add_primary_key(table, &columns));
        }

        let kind = match (&target.primary_key, &source.primary_key) {
            (None, _) => DiffKind::IndexAdded,
            (_, None) => DiffKind::IndexRemoved,
            _ => DiffKind::IndexModified,
        };
        let name = target
            .primary_key
            .as_ref()
            .or(source.primary_key.as_ref())
            .and_then(|pk| pk.name.as_deref())
            .unwrap_or(PRIMARY_KEY_ITEM);
        let mut item = DiffItem::new(kind, table, Some(name)).sql(statements);
        item.before = target.primary_key.clone().map(SchemaObject::PrimaryKey);
        item.after = source.primary_key.clone().map(SchemaObject::PrimaryKey);
        item
    }

    /// Replace the table's per-item DDL with one SQLite rebuild carried by the first item
    fn attach_rebuild(&self, items: &mut [DiffItem], source: &TableDef, target: &TableDef) {
        let desired = self.desired_table(source, Some(target));
        let copy: Vec<(String, String)> = desired
            .columns
            .iter()
            .filter_map(|column| {
                target
                    .column(&column.name, &self.rules)
                    .map(|existing| (column.name.clone(), existing.name.clone()))
            })
            .collect();
        let statements = self.dialect.rebuild_table(&target.name, &desired, &copy);

        for (i, item) in items.iter_mut().enumerate() {
            if i == 0 {
                item.migration_sql = statements.clone();
                item.note = Some(format!("rebuilds table '{}'", target.name));
            } else {
                item.migration_sql.clear();
                item.note = Some(REBUILD_NOTE.to_string());
            }
        }
    }
}

/// Columns SQLite's ADD COLUMN cannot create
fn sqlite_can_add_column(column: &ColumnDef) -> bool {
    if column.auto_increment {
        return false;
    }
    match &column.default {
        None => column.nullable,
        Some(default) => {
            let upper = default.to_ascii_uppercase();
            !upper.starts_with("CURRENT_") && !default.contains('(')
        }
    }
}
