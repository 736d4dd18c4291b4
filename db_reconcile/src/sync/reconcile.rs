//! Row-level reconciliation of one table between two connections
//!
//! Rows are identified by a key tuple read as text on both sides, so keys of different
//! engines compare by their textual rendering. Writes go to the target only, in the order
//! delete, update, insert, each batch in its own transaction.

use std::collections::{BTreeSet, HashMap};

use crate::db::connector::{Connector, Value};
use crate::db::context::OpContext;
use crate::db::engine::CaseRules;
use crate::error::{Error, Result};
use crate::schema::dialect::Dialect;
use crate::schema::normalize::normalize_table;
use crate::schema::types::{ColumnDef, TableDef};
use crate::sync::types::{PendingCounts, RowDiff, SchemaScope, SyncOptions, SyncResult};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Key tuple rendered as text, in key column order
pub(crate) type Key = Vec<String>;

/// A table as seen through one connection
pub(crate) struct Side<'a> {
    pub connector: &'a dyn Connector,
    pub dialect: Dialect,
    pub label: &'static str,
}

impl<'a> Side<'a> {
    /// Resolve the schema and build a renderer qualified when it is not the session default
    pub async fn open(
        connector: &'a dyn Connector,
        schema: Option<&str>,
        label: &'static str,
        ctx: &OpContext,
    ) -> Result<(Side<'a>, String)> {
        let current = ctx.run("current schema", connector.current_schema()).await?;
        let schema = match schema {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => current.clone(),
        };
        let qualified = (schema != current).then_some(schema.as_str());
        let side = Side {
            connector,
            dialect: Dialect::new(connector.engine(), qualified),
            label,
        };
        Ok((side, schema))
    }

    pub async fn table(&self, schema: &str, table: &str, ctx: &OpContext) -> Result<TableDef> {
        let raw = ctx
            .run(
                "table introspection",
                self.connector.get_table_schema(schema, table),
            )
            .await?;
        Ok(normalize_table(self.connector.engine(), &raw))
    }

    pub async fn count(&self, table: &str, ctx: &OpContext) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.dialect.table(table));
        let rows = ctx.run("row count", self.connector.query(&sql, &[])).await?;
        let value = rows.first().and_then(|row| row.get(0));
        Ok(match value {
            Some(Value::Int(n)) => (*n).max(0) as u64,
            Some(other) => other
                .to_text()
                .and_then(|text| text.parse().ok())
                .unwrap_or_default(),
            None => 0,
        })
    }

    /// Every key tuple of the table; NULL or repeated keys are a configuration error
    pub async fn keys(
        &self,
        table: &str,
        key_columns: &[&ColumnDef],
        ctx: &OpContext,
    ) -> Result<BTreeSet<Key>> {
        let select: Vec<String> = key_columns
            .iter()
            .map(|c| self.dialect.text_select(&c.name, &c.data_type))
            .collect();
        let sql = format!(
            "SELECT {} FROM {}",
            select.join(", "),
            self.dialect.table(table)
        );
        let rows = ctx.run("fetch keys", self.connector.query(&sql, &[])).await?;

        let mut keys = BTreeSet::new();
        for row in rows {
            let mut key = Vec::with_capacity(key_columns.len());
            for (column, value) in key_columns.iter().zip(row.values.iter()) {
                match value.to_text() {
                    Some(text) => key.push(text),
                    None => {
                        return Err(Error::Configuration(format!(
                            "{} table '{}' has a NULL value in key column '{}'",
                            self.label, table, column.name
                        )))
                    }
                }
            }
            if !keys.insert(key.clone()) {
                return Err(Error::Configuration(format!(
                    "{} table '{}' has duplicate key ({}); the key columns do not identify rows",
                    self.label,
                    table,
                    key.join(", ")
                )));
            }
        }
        Ok(keys)
    }

    /// Text values of `columns` for the rows with the given keys
    async fn rows(
        &self,
        table: &str,
        key_columns: &[&ColumnDef],
        columns: &[&ColumnDef],
        keys: &[Key],
        ctx: &OpContext,
    ) -> Result<HashMap<Key, Vec<Option<String>>>> {
        let select: Vec<String> = key_columns
            .iter()
            .chain(columns.iter())
            .map(|c| self.dialect.text_select(&c.name, &c.data_type))
            .collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            select.join(", "),
            self.dialect.table(table),
            key_predicate(&self.dialect, key_columns, keys)
        );
        let rows = ctx.run("fetch rows", self.connector.query(&sql, &[])).await?;

        let width = key_columns.len();
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut texts = row.values.iter().map(Value::to_text);
                let key: Key = texts
                    .by_ref()
                    .take(width)
                    .map(Option::unwrap_or_default)
                    .collect();
                (key, texts.collect())
            })
            .collect())
    }
}

/// `WHERE` predicate matching the given key tuples.
///
/// Compares the key columns themselves against typed literals so the engine can use
/// the key's index.
pub(crate) fn key_predicate(
    dialect: &Dialect,
    key_columns: &[&ColumnDef],
    keys: &[Key],
) -> String {
    let literal =
        |column: &ColumnDef, text: &str| dialect.value_literal(Some(text), &column.data_type);

    if let [column] = key_columns {
        let values: Vec<String> = keys
            .iter()
            .map(|k| literal(*column, k[0].as_str()))
            .collect();
        return format!("{} IN ({})", dialect.ident(&column.name), values.join(", "));
    }

    keys.iter()
        .map(|key| {
            let parts: Vec<String> = key_columns
                .iter()
                .zip(key.iter())
                .map(|(column, value)| {
                    let literal = literal(*column, value.as_str());
                    format!("{} = {}", dialect.ident(&column.name), literal)
                })
                .collect();
            format!("({})", parts.join(" AND "))
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Key and value columns resolved on both sides
pub(crate) struct ColumnMap<'t> {
    pub source_keys: Vec<&'t ColumnDef>,
    pub target_keys: Vec<&'t ColumnDef>,
    pub source_values: Vec<&'t ColumnDef>,
    pub target_values: Vec<&'t ColumnDef>,
}

impl<'t> ColumnMap<'t> {
    /// Resolve key columns on both sides and pair the common non-key columns.
    ///
    /// Fails when a key column is missing or nullable on either side.
    pub fn resolve(
        source: &'t TableDef,
        target: &'t TableDef,
        keys: &[String],
        rules: &CaseRules,
    ) -> Result<Self> {
        let mut map = ColumnMap {
            source_keys: Vec::new(),
            target_keys: Vec::new(),
            source_values: Vec::new(),
            target_values: Vec::new(),
        };

        for key in keys {
            for (label, table, resolved) in [
                ("source", source, &mut map.source_keys),
                ("target", target, &mut map.target_keys),
            ] {
                let column = table.column(key, rules).ok_or_else(|| {
                    Error::Configuration(format!(
                        "key column '{}' not found in {} table '{}'",
                        key, label, table.name
                    ))
                })?;
                if column.nullable {
                    return Err(Error::Configuration(format!(
                        "key column '{}' is nullable in {} table '{}'",
                        column.name, label, table.name
                    )));
                }
                resolved.push(column);
            }
        }

        for column in &source.columns {
            if keys.iter().any(|k| rules.columns.same(k, &column.name)) {
                continue;
            }
            if let Some(existing) = target.column(&column.name, rules) {
                map.source_values.push(column);
                map.target_values.push(existing);
            }
        }
        Ok(map)
    }
}

/// Reconcile `table` on the target with the source.
///
/// Option and key problems fail before any data query. A failing write batch is rolled
/// back, recorded in `errors`, and ends the run for this table; earlier batches stay
/// committed.
pub async fn sync_table_data(
    source: &dyn Connector,
    target: &dyn Connector,
    scope: &SchemaScope,
    table: &str,
    options: &SyncOptions,
    ctx: &OpContext,
) -> Result<SyncResult> {
    options.validate()?;
    let batch_size = options.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);

    let (source_side, source_schema) =
        Side::open(source, scope.source.as_deref(), "source", ctx).await?;
    let (target_side, target_schema) =
        Side::open(target, scope.target.as_deref(), "target", ctx).await?;
    let rules = ctx
        .run("case rules", source.case_rules())
        .await?
        .combine(ctx.run("case rules", target.case_rules()).await?);

    let source_table = source_side.table(&source_schema, table, ctx).await?;
    let target_table = target_side.table(&target_schema, table, ctx).await?;
    let columns = ColumnMap::resolve(&source_table, &target_table, &options.primary_keys, &rules)?;
    let (source_name, target_name) = (source_table.name.as_str(), target_table.name.as_str());

    let source_keys = source_side.keys(source_name, &columns.source_keys, ctx).await?;
    let target_keys = target_side.keys(target_name, &columns.target_keys, ctx).await?;

    let only_source: Vec<Key> = source_keys.difference(&target_keys).cloned().collect();
    let only_target: Vec<Key> = target_keys.difference(&source_keys).cloned().collect();
    let in_both: Vec<Key> = source_keys.intersection(&target_keys).cloned().collect();

    let mut result = SyncResult::new(table);
    result.row_diff = Some(RowDiff {
        table: table.to_string(),
        source_count: source_keys.len() as u64,
        target_count: target_keys.len() as u64,
        missing_in_target: Some(only_source.len() as u64),
        missing_in_source: Some(only_target.len() as u64),
    });

    // only keys are kept; values are re-read per update batch
    let mut changed: Vec<Key> = Vec::new();
    if !columns.source_values.is_empty() {
        for chunk in in_both.chunks(batch_size) {
            if ctx.is_cancelled() {
                result.cancelled = true;
                return Ok(result);
            }
            let (source_rows, target_rows) = tokio::try_join!(
                source_side.rows(source_name, &columns.source_keys, &columns.source_values, chunk, ctx),
                target_side.rows(target_name, &columns.target_keys, &columns.target_values, chunk, ctx),
            )?;
            for key in chunk {
                let (Some(values), Some(existing)) = (source_rows.get(key), target_rows.get(key))
                else {
                    continue;
                };
                if values != existing {
                    changed.push(key.clone());
                }
            }
        }
    }

    result.pending = PendingCounts {
        insert: only_source.len() as u64,
        update: changed.len() as u64,
        delete: only_target.len() as u64,
    };
    for (enabled, count, what, flag) in [
        (options.delete_extra, only_target.len(), "extra rows not deleted", "delete_extra"),
        (options.update_different, changed.len(), "differing rows not updated", "update_different"),
        (options.insert_missing, only_source.len(), "missing rows not inserted", "insert_missing"),
    ] {
        if !enabled && count > 0 {
            result.skipped.push(format!("{} {} ({} disabled)", count, what, flag));
        }
    }

    let writer = Writer {
        source: &source_side,
        source_table: source_name,
        target: &target_side,
        table: target_name,
        columns: &columns,
        ctx,
    };

    if options.delete_extra {
        for (n, chunk) in only_target.chunks(batch_size).enumerate() {
            let statements = vec![writer.delete(chunk)];
            match writer.run(&mut result, "delete", n, &statements).await {
                Some(()) => result.deleted += chunk.len() as u64,
                None => return Ok(finish(result)),
            }
        }
    }

    if options.update_different {
        for (n, chunk) in changed.chunks(batch_size).enumerate() {
            let Some(rows) = writer.source_rows(&mut result, "update", n, chunk).await else {
                return Ok(finish(result));
            };
            let statements: Vec<String> = chunk
                .iter()
                .filter_map(|key| rows.get(key).map(|values| writer.update(key, values)))
                .collect();
            if statements.is_empty() {
                continue;
            }
            match writer.run(&mut result, "update", n, &statements).await {
                Some(()) => result.updated += statements.len() as u64,
                None => return Ok(finish(result)),
            }
        }
    }

    if options.insert_missing {
        for (n, chunk) in only_source.chunks(batch_size).enumerate() {
            let Some(rows) = writer.source_rows(&mut result, "insert", n, chunk).await else {
                return Ok(finish(result));
            };
            let rows: Vec<(&Key, &Vec<Option<String>>)> =
                chunk.iter().filter_map(|key| rows.get_key_value(key)).collect();
            if rows.is_empty() {
                continue;
            }
            let statements = vec![writer.insert(&rows)];
            match writer.run(&mut result, "insert", n, &statements).await {
                Some(()) => result.inserted += rows.len() as u64,
                None => return Ok(finish(result)),
            }
        }
    }

    Ok(finish(result))
}

fn finish(result: SyncResult) -> SyncResult {
    tracing::info!(
        table = %result.table,
        run_id = %result.run_id,
        inserted = result.inserted,
        updated = result.updated,
        deleted = result.deleted,
        errors = result.errors.len(),
        cancelled = result.cancelled,
        "Table sync completed"
    );
    result
}

/// Reads batch values from the source; renders and runs write batches against the target
struct Writer<'w> {
    source: &'w Side<'w>,
    source_table: &'w str,
    target: &'w Side<'w>,
    table: &'w str,
    columns: &'w ColumnMap<'w>,
    ctx: &'w OpContext,
}

impl<'w> Writer<'w> {
    fn delete(&self, keys: &[Key]) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            self.target.dialect.table(self.table),
            key_predicate(&self.target.dialect, &self.columns.target_keys, keys)
        )
    }

    fn update(&self, key: &Key, values: &[Option<String>]) -> String {
        let dialect = &self.target.dialect;
        let assignments: Vec<String> = self
            .columns
            .target_values
            .iter()
            .zip(values.iter())
            .map(|(column, value)| {
                format!(
                    "{} = {}",
                    dialect.ident(&column.name),
                    dialect.value_literal(value.as_deref(), &column.data_type)
                )
            })
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {}",
            dialect.table(self.table),
            assignments.join(", "),
            key_predicate(dialect, &self.columns.target_keys, std::slice::from_ref(key))
        )
    }

    fn insert(&self, rows: &[(&Key, &Vec<Option<String>>)]) -> String {
        let dialect = &self.target.dialect;
        let names: Vec<String> = self
            .columns
            .target_keys
            .iter()
            .chain(self.columns.target_values.iter())
            .map(|c| dialect.ident(&c.name))
            .collect();

        let tuples: Vec<String> = rows
            .iter()
            .map(|(key, values)| {
                let keys = self
                    .columns
                    .target_keys
                    .iter()
                    .zip(key.iter())
                    .map(|(column, text)| dialect.value_literal(Some(text), &column.data_type));
                let rest = self
                    .columns
                    .target_values
                    .iter()
                    .zip(values.iter())
                    .map(|(column, value)| dialect.value_literal(value.as_deref(), &column.data_type));
                format!("({})", keys.chain(rest).collect::<Vec<_>>().join(", "))
            })
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            dialect.table(self.table),
            names.join(", "),
            tuples.join(", ")
        )
    }

    /// Current source values for one batch; `None` means the table's run must stop
    async fn source_rows(
        &self,
        result: &mut SyncResult,
        bucket: &str,
        batch: usize,
        keys: &[Key],
    ) -> Option<HashMap<Key, Vec<Option<String>>>> {
        if self.ctx.is_cancelled() {
            result.cancelled = true;
            return None;
        }
        let columns = self.columns;
        match self
            .source
            .rows(self.source_table, &columns.source_keys, &columns.source_values, keys, self.ctx)
            .await
        {
            Ok(rows) => Some(rows),
            Err(Error::Cancelled(_)) => {
                result.cancelled = true;
                None
            }
            Err(e) => {
                result
                    .errors
                    .push(format!("{} batch {} failed reading source: {}", bucket, batch + 1, e));
                None
            }
        }
    }

    /// Run one batch in a transaction; `None` means the table's run must stop
    async fn run(
        &self,
        result: &mut SyncResult,
        bucket: &str,
        batch: usize,
        statements: &[String],
    ) -> Option<()> {
        if self.ctx.is_cancelled() {
            result.cancelled = true;
            return None;
        }
        match self
            .ctx
            .run(
                "sync batch",
                self.target.connector.execute_in_transaction(statements),
            )
            .await
        {
            Ok(_) => Some(()),
            Err(Error::Cancelled(_)) => {
                result.cancelled = true;
                None
            }
            Err(e) => {
                tracing::warn!(table = self.table, bucket, batch = batch + 1, error = %e, "Sync batch failed");
                result
                    .errors
                    .push(format!("{} batch {} failed: {}", bucket, batch + 1, e));
                None
            }
        }
    }
}

/// Row counts for every table present on either side
pub async fn get_table_row_counts(
    source: &dyn Connector,
    target: &dyn Connector,
    scope: &SchemaScope,
    ctx: &OpContext,
) -> Result<Vec<RowDiff>> {
    let (source_side, source_schema) =
        Side::open(source, scope.source.as_deref(), "source", ctx).await?;
    let (target_side, target_schema) =
        Side::open(target, scope.target.as_deref(), "target", ctx).await?;
    let rules = ctx
        .run("case rules", source.case_rules())
        .await?
        .combine(ctx.run("case rules", target.case_rules()).await?);

    let source_tables = ctx.run("list tables", source.get_tables(&source_schema)).await?;
    let target_tables = ctx.run("list tables", target.get_tables(&target_schema)).await?;

    let mut union: std::collections::BTreeMap<String, (Option<String>, Option<String>)> =
        std::collections::BTreeMap::new();
    for info in source_tables {
        let key = rules.tables.key(&info.name);
        union.entry(key).or_default().0 = Some(info.name);
    }
    for info in target_tables {
        let key = rules.tables.key(&info.name);
        union.entry(key).or_default().1 = Some(info.name);
    }

    let mut diffs = Vec::with_capacity(union.len());
    for (_, (source_name, target_name)) in union {
        ctx.check("row counts")?;
        let source_count = match &source_name {
            Some(name) => source_side.count(name, ctx).await?,
            None => 0,
        };
        let target_count = match &target_name {
            Some(name) => target_side.count(name, ctx).await?,
            None => 0,
        };

        let mut diff = RowDiff {
            table: source_name.clone().or_else(|| target_name.clone()).unwrap_or_default(),
            source_count,
            target_count,
            missing_in_target: None,
            missing_in_source: None,
        };

        if let (Some(source_name), Some(target_name)) = (&source_name, &target_name) {
            let keyed = key_presence(
                (&source_side, source_schema.as_str(), source_name.as_str()),
                (&target_side, target_schema.as_str(), target_name.as_str()),
                &rules,
                ctx,
            )
            .await;
            match keyed {
                Ok(Some((missing_in_target, missing_in_source))) => {
                    diff.missing_in_target = Some(missing_in_target);
                    diff.missing_in_source = Some(missing_in_source);
                }
                Ok(None) => {}
                Err(e @ (Error::Connection { .. } | Error::Cancelled(_))) => return Err(e),
                Err(e) => {
                    tracing::warn!(table = %diff.table, error = %e, "Key comparison unavailable");
                }
            }
        }
        diffs.push(diff);
    }

    tracing::info!(tables = diffs.len(), "Row counts collected");
    Ok(diffs)
}

/// Keys missing on each side, when the source primary key exists non-null on both
async fn key_presence(
    source: (&Side<'_>, &str, &str),
    target: (&Side<'_>, &str, &str),
    rules: &CaseRules,
    ctx: &OpContext,
) -> Result<Option<(u64, u64)>> {
    let source_table = source.0.table(source.1, source.2, ctx).await?;
    let target_table = target.0.table(target.1, target.2, ctx).await?;
    let keys = source_table.primary_key_columns().to_vec();
    if keys.is_empty() {
        return Ok(None);
    }
    let Ok(columns) = ColumnMap::resolve(&source_table, &target_table, &keys, rules) else {
        return Ok(None);
    };

    let source_keys = source.0.keys(source.2, &columns.source_keys, ctx).await?;
    let target_keys = target.0.keys(target.2, &columns.target_keys, ctx).await?;
    Ok(Some((
        source_keys.difference(&target_keys).count() as u64,
        target_keys.difference(&source_keys).count() as u64,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::engine::Engine;
    use crate::schema::types::LogicalType;

    fn key(parts: &[&str]) -> Key {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn single_key_predicate_compares_the_native_column() {
        let id = ColumnDef::new("id", LogicalType::BigInt).nullable(false);
        let predicate = key_predicate(
            &Dialect::new(Engine::Postgres, None),
            &[&id],
            &[key(&["1"]), key(&["20"])],
        );
        assert_eq!(predicate, "id IN (1, 20)");
    }

    #[test]
    fn composite_key_predicate_uses_typed_literals() {
        let guest = ColumnDef::new("guest", LogicalType::Text).nullable(false);
        let night = ColumnDef::new("night", LogicalType::Integer).nullable(false);
        let predicate = key_predicate(
            &Dialect::new(Engine::Sqlite, None),
            &[&guest, &night],
            &[key(&["ada", "1"]), key(&["o'hara", "2"])],
        );
        assert_eq!(
            predicate,
            "(guest = 'ada' AND night = 1) OR (guest = 'o''hara' AND night = 2)"
        );
    }
}
