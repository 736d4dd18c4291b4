//! PostgreSQL metadata queries and row decoding

use indexmap::IndexMap;
use sqlx::postgres::PgRow;
use sqlx::{Column, FromRow, PgPool, Row as _, TypeInfo};

use crate::db::connector::{RawColumn, RawForeignKey, RawIndex, Row, TableInfo, TableSchema, Value};
use crate::error::{Error, Result};

#[derive(FromRow)]
struct TableRow {
    table_name: String,
    estimated_rows: Option<i64>,
}

#[derive(FromRow)]
struct ColumnRow {
    column_name: String,
    data_type: String,
    is_nullable: bool,
    column_default: Option<String>,
    ordinal_position: i32,
    is_identity: bool,
}

#[derive(FromRow)]
struct IndexRow {
    index_name: String,
    column_name: String,
    is_unique: bool,
    is_primary: bool,
    backs_constraint: bool,
}

#[derive(FromRow)]
struct ForeignKeyRow {
    constraint_name: String,
    column_name: String,
    ref_table: String,
    ref_column: String,
    delete_rule: String,
    update_rule: String,
}

pub(crate) async fn get_schemas(pool: &PgPool) -> Result<Vec<String>> {
    let sql = r#"
        SELECT nspname::text
        FROM pg_namespace
        WHERE nspname NOT LIKE 'pg\_%' AND nspname <> 'information_schema'
        ORDER BY 1
    "#;
    Ok(sqlx::query_scalar::<_, String>(sql).fetch_all(pool).await?)
}

pub(crate) async fn get_tables(pool: &PgPool, schema: &str) -> Result<Vec<TableInfo>> {
    let sql = r#"
        SELECT c.relname::text AS table_name,
               GREATEST(c.reltuples, 0)::int8 AS estimated_rows
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')
        ORDER BY c.relname
    "#;

    let rows = sqlx::query_as::<_, TableRow>(sql)
        .bind(schema)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|r| TableInfo {
            name: r.table_name,
            estimated_rows: r.estimated_rows,
        })
        .collect())
}

pub(crate) async fn get_table_schema(pool: &PgPool, schema: &str, table: &str) -> Result<TableSchema> {
    let mut table_schema = TableSchema::new(table);

    // format_type keeps length/precision modifiers, unlike information_schema.data_type
    let sql = r#"
        SELECT a.attname::text AS column_name,
               format_type(a.atttypid, a.atttypmod) AS data_type,
               NOT a.attnotnull AS is_nullable,
               pg_get_expr(d.adbin, d.adrelid) AS column_default,
               a.attnum::int4 AS ordinal_position,
               (a.attidentity <> '') AS is_identity
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE n.nspname = $1 AND c.relname = $2
          AND a.attnum > 0 AND NOT a.attisdropped
        ORDER BY a.attnum
    "#;

    let column_rows = sqlx::query_as::<_, ColumnRow>(sql)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await?;

    if column_rows.is_empty() {
        return Err(Error::Introspection {
            table: table.to_string(),
            message: format!("table not found in schema '{}' or not readable", schema),
        });
    }

    for col in column_rows {
        let is_serial = col
            .column_default
            .as_deref()
            .map_or(false, |d| d.starts_with("nextval("));
        table_schema.columns.push(RawColumn {
            name: col.column_name,
            data_type: col.data_type,
            nullable: col.is_nullable,
            default: col.column_default,
            ordinal_position: col.ordinal_position.max(0) as u32,
            auto_increment: col.is_identity || is_serial,
        });
    }

    let sql = r#"
        SELECT i.relname::text AS index_name,
               a.attname::text AS column_name,
               ix.indisunique AS is_unique,
               ix.indisprimary AS is_primary,
               EXISTS (
                   SELECT 1 FROM pg_constraint con
                   WHERE con.conindid = ix.indexrelid AND con.contype IN ('u', 'p')
               ) AS backs_constraint
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE n.nspname = $1 AND t.relname = $2
        ORDER BY i.relname, k.ord
    "#;

    let index_rows = sqlx::query_as::<_, IndexRow>(sql)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await?;

    let mut indexes: IndexMap<String, RawIndex> = IndexMap::new();
    for row in index_rows {
        if row.is_primary {
            table_schema.primary_key_name.get_or_insert(row.index_name);
            table_schema.primary_key.push(row.column_name);
            continue;
        }
        indexes
            .entry(row.index_name.clone())
            .or_insert_with(|| RawIndex {
                name: row.index_name,
                columns: Vec::new(),
                unique: row.is_unique,
                backs_constraint: row.backs_constraint,
            })
            .columns
            .push(row.column_name);
    }
    table_schema.indexes = indexes.into_values().collect();

    let sql = r#"
        SELECT con.conname::text AS constraint_name,
               a.attname::text AS column_name,
               rt.relname::text AS ref_table,
               ra.attname::text AS ref_column,
               con.confdeltype::text AS delete_rule,
               con.confupdtype::text AS update_rule
        FROM pg_constraint con
        JOIN pg_class t ON t.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_class rt ON rt.oid = con.confrelid
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, ref_attnum, ord)
        JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
        JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.ref_attnum
        WHERE con.contype = 'f' AND n.nspname = $1 AND t.relname = $2
        ORDER BY con.conname, k.ord
    "#;

    let fk_rows = sqlx::query_as::<_, ForeignKeyRow>(sql)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await?;

    let mut foreign_keys: IndexMap<String, RawForeignKey> = IndexMap::new();
    for row in fk_rows {
        let fk = foreign_keys
            .entry(row.constraint_name.clone())
            .or_insert_with(|| RawForeignKey {
                name: row.constraint_name,
                columns: Vec::new(),
                ref_table: row.ref_table,
                ref_columns: Vec::new(),
                on_delete: Some(row.delete_rule),
                on_update: Some(row.update_rule),
            });
        fk.columns.push(row.column_name);
        fk.ref_columns.push(row.ref_column);
    }
    table_schema.foreign_keys = foreign_keys.into_values().collect();

    Ok(table_schema)
}

pub(crate) async fn server_version(pool: &PgPool) -> Result<String> {
    Ok(sqlx::query_scalar::<_, String>("SELECT version()")
        .fetch_one(pool)
        .await?)
}

pub(crate) async fn current_schema(pool: &PgPool) -> Result<String> {
    Ok(sqlx::query_scalar::<_, String>("SELECT current_schema()::text")
        .fetch_one(pool)
        .await?)
}

/// Decode a row into engine-neutral values.
///
/// Types outside the simple scalar set must be cast to text in the query.
pub(crate) fn decode_row(row: &PgRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        let type_name = column.type_info().name().to_ascii_uppercase();
        let value = match type_name.as_str() {
            "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
            "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(|v| Value::Int(v.into())),
            "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(|v| Value::Int(v.into())),
            "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::Int),
            "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(|v| Value::Float(v.into())),
            "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::Float),
            "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(idx)?.map(Value::Bytes),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(idx)?.map(Value::Text)
            }
            other => {
                return Err(Error::Database(format!(
                    "column '{}' has type {} which must be cast to text",
                    column.name(),
                    other
                )))
            }
        };
        values.push(value.unwrap_or(Value::Null));
    }

    Ok(Row { columns, values })
}
