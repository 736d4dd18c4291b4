//! MySQL and MariaDB metadata queries and row decoding

use indexmap::IndexMap;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, FromRow, MySqlPool, Row as _, TypeInfo};

use crate::db::connector::{RawColumn, RawForeignKey, RawIndex, Row, TableInfo, TableSchema, Value};
use crate::db::engine::CaseRules;
use crate::error::{Error, Result};

// information_schema columns come back as a mix of VARCHAR, LONGTEXT and VARBINARY
// depending on server version; every text column is cast to CHAR explicitly.

#[derive(FromRow)]
struct TableRow {
    table_name: String,
    estimated_rows: Option<i64>,
}

#[derive(FromRow)]
struct ColumnRow {
    column_name: String,
    data_type: String,
    is_nullable: String,
    column_default: Option<String>,
    ordinal_position: i64,
    extra: Option<String>,
}

#[derive(FromRow)]
struct IndexRow {
    index_name: String,
    column_name: Option<String>,
    non_unique: i64,
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

pub(crate) async fn get_schemas(pool: &MySqlPool) -> Result<Vec<String>> {
    let sql = r#"
        SELECT CAST(schema_name AS CHAR)
        FROM information_schema.schemata
        WHERE schema_name NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
        ORDER BY 1
    "#;
    Ok(sqlx::query_scalar::<_, String>(sql).fetch_all(pool).await?)
}

pub(crate) async fn get_tables(pool: &MySqlPool, schema: &str) -> Result<Vec<TableInfo>> {
    let sql = r#"
        SELECT CAST(table_name AS CHAR) AS table_name,
               CAST(table_rows AS SIGNED) AS estimated_rows
        FROM information_schema.tables
        WHERE table_schema = ? AND table_type = 'BASE TABLE'
        ORDER BY table_name
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

pub(crate) async fn get_table_schema(
    pool: &MySqlPool,
    schema: &str,
    table: &str,
) -> Result<TableSchema> {
    let mut table_schema = TableSchema::new(table);

    let sql = r#"
        SELECT CAST(column_name AS CHAR) AS column_name,
               CAST(column_type AS CHAR) AS data_type,
               CAST(is_nullable AS CHAR) AS is_nullable,
               CAST(column_default AS CHAR) AS column_default,
               CAST(ordinal_position AS SIGNED) AS ordinal_position,
               CAST(extra AS CHAR) AS extra
        FROM information_schema.columns
        WHERE table_schema = ? AND table_name = ?
        ORDER BY ordinal_position
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
        let auto_increment = col
            .extra
            .as_deref()
            .map_or(false, |e| e.to_ascii_lowercase().contains("auto_increment"));
        table_schema.columns.push(RawColumn {
            name: col.column_name,
            data_type: col.data_type,
            nullable: col.is_nullable == "YES",
            default: col.column_default,
            ordinal_position: col.ordinal_position.max(0) as u32,
            auto_increment,
        });
    }

    let sql = r#"
        SELECT CAST(index_name AS CHAR) AS index_name,
               CAST(column_name AS CHAR) AS column_name,
               CAST(non_unique AS SIGNED) AS non_unique
        FROM information_schema.statistics
        WHERE table_schema = ? AND table_name = ?
        ORDER BY index_name, seq_in_index
    "#;

    let index_rows = sqlx::query_as::<_, IndexRow>(sql)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await?;

    let mut indexes: IndexMap<String, RawIndex> = IndexMap::new();
    for row in index_rows {
        // functional index parts have no column
        let Some(column_name) = row.column_name else {
            continue;
        };
        if row.index_name == "PRIMARY" {
            table_schema.primary_key_name = Some("PRIMARY".to_string());
            table_schema.primary_key.push(column_name);
            continue;
        }
        indexes
            .entry(row.index_name.clone())
            .or_insert_with(|| RawIndex {
                name: row.index_name,
                columns: Vec::new(),
                unique: row.non_unique == 0,
                backs_constraint: false,
            })
            .columns
            .push(column_name);
    }
    table_schema.indexes = indexes.into_values().collect();

    let sql = r#"
        SELECT CAST(k.constraint_name AS CHAR) AS constraint_name,
               CAST(k.column_name AS CHAR) AS column_name,
               CAST(k.referenced_table_name AS CHAR) AS ref_table,
               CAST(k.referenced_column_name AS CHAR) AS ref_column,
               CAST(r.delete_rule AS CHAR) AS delete_rule,
               CAST(r.update_rule AS CHAR) AS update_rule
        FROM information_schema.key_column_usage k
        JOIN information_schema.referential_constraints r
          ON r.constraint_schema = k.constraint_schema
         AND r.constraint_name = k.constraint_name
         AND r.table_name = k.table_name
        WHERE k.table_schema = ? AND k.table_name = ?
          AND k.referenced_table_name IS NOT NULL
        ORDER BY k.constraint_name, k.ordinal_position
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

pub(crate) async fn server_version(pool: &MySqlPool) -> Result<String> {
    Ok(sqlx::query_scalar::<_, String>("SELECT CAST(VERSION() AS CHAR)")
        .fetch_one(pool)
        .await?)
}

pub(crate) async fn current_schema(pool: &MySqlPool) -> Result<String> {
    let schema = sqlx::query_scalar::<_, Option<String>>("SELECT CAST(DATABASE() AS CHAR)")
        .fetch_one(pool)
        .await?;
    schema.ok_or_else(|| Error::Configuration("connection has no default database".into()))
}

pub(crate) async fn case_rules(pool: &MySqlPool) -> Result<CaseRules> {
    let setting = sqlx::query_scalar::<_, i64>("SELECT CAST(@@lower_case_table_names AS SIGNED)")
        .fetch_one(pool)
        .await?;
    Ok(CaseRules::mysql(setting))
}

pub(crate) fn decode_row(row: &MySqlRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        let type_name = column.type_info().name().to_ascii_uppercase();
        let value = if type_name == "BOOLEAN" {
            row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool)
        } else if type_name.ends_with("UNSIGNED") {
            row.try_get::<Option<u64>, _>(idx)?.map(|v| match i64::try_from(v) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Text(v.to_string()),
            })
        } else if matches!(
            type_name.as_str(),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT"
        ) {
            row.try_get::<Option<i64>, _>(idx)?.map(Value::Int)
        } else if matches!(type_name.as_str(), "FLOAT" | "DOUBLE") {
            row.try_get::<Option<f64>, _>(idx)?.map(Value::Float)
        } else if type_name.contains("BLOB") || type_name.contains("BINARY") {
            row.try_get::<Option<Vec<u8>>, _>(idx)?.map(Value::Bytes)
        } else if type_name == "NULL" {
            None
        } else {
            row.try_get::<Option<String>, _>(idx)?.map(Value::Text)
        };
        values.push(value.unwrap_or(Value::Null));
    }

    Ok(Row { columns, values })
}
