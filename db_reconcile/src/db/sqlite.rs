//! SQLite metadata queries and row decoding

use indexmap::IndexMap;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row as _, SqlitePool, TypeInfo, ValueRef};

use crate::db::connector::{RawColumn, RawForeignKey, RawIndex, Row, TableInfo, TableSchema, Value};
use crate::db::engine::Engine;
use crate::error::{Error, Result};
use crate::utils::naming::get_foreign_key_name;

#[derive(FromRow)]
struct ColumnRow {
    name: String,
    #[sqlx(rename = "type")]
    data_type: String,
    notnull: i64,
    dflt_value: Option<String>,
    pk: i64,
    cid: i64,
}

#[derive(FromRow)]
struct IndexRow {
    name: String,
    #[sqlx(rename = "unique")]
    is_unique: i64,
    origin: String,
}

#[derive(FromRow)]
struct ForeignKeyRow {
    id: i64,
    #[sqlx(rename = "table")]
    ref_table: String,
    #[sqlx(rename = "from")]
    column_name: String,
    #[sqlx(rename = "to")]
    ref_column: Option<String>,
    on_update: String,
    on_delete: String,
}

/// Attached databases; the schema name selects one of them
pub(crate) async fn get_schemas(pool: &SqlitePool) -> Result<Vec<String>> {
    Ok(
        sqlx::query_scalar::<_, String>("SELECT name FROM pragma_database_list ORDER BY seq")
            .fetch_all(pool)
            .await?,
    )
}

pub(crate) async fn get_tables(pool: &SqlitePool, schema: &str) -> Result<Vec<TableInfo>> {
    let sql = format!(
        "SELECT name FROM \"{}\".sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
         ORDER BY name",
        schema.replace('"', "\"\"")
    );

    let names = sqlx::query_scalar::<_, String>(&sql).fetch_all(pool).await?;

    // no statistics without ANALYZE, so no estimate
    Ok(names
        .into_iter()
        .map(|name| TableInfo {
            name,
            estimated_rows: None,
        })
        .collect())
}

pub(crate) async fn get_table_schema(
    pool: &SqlitePool,
    schema: &str,
    table: &str,
) -> Result<TableSchema> {
    let mut table_schema = TableSchema::new(table);

    let mut column_rows = sqlx::query_as::<_, ColumnRow>(
        "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1, ?2)",
    )
    .bind(table)
    .bind(schema)
    .fetch_all(pool)
    .await?;

    if column_rows.is_empty() {
        return Err(Error::Introspection {
            table: table.to_string(),
            message: format!("table not found in schema '{}' or not readable", schema),
        });
    }
    column_rows.sort_by_key(|c| c.cid);

    let mut pk_columns: Vec<(i64, String)> = column_rows
        .iter()
        .filter(|c| c.pk > 0)
        .map(|c| (c.pk, c.name.clone()))
        .collect();
    pk_columns.sort();

    // only a lone INTEGER PRIMARY KEY declared AUTOINCREMENT counts as generated
    let rowid_alias = match pk_columns.as_slice() {
        [(_, name)] => column_rows
            .iter()
            .any(|c| &c.name == name && c.data_type.eq_ignore_ascii_case("INTEGER")),
        _ => false,
    };
    let autoincrement = rowid_alias && declares_autoincrement(pool, schema, table).await?;

    for col in column_rows {
        let auto_increment = autoincrement && col.pk > 0;
        table_schema.columns.push(RawColumn {
            name: col.name,
            data_type: col.data_type,
            nullable: col.notnull == 0 && col.pk == 0,
            default: col.dflt_value,
            ordinal_position: (col.cid + 1).max(0) as u32,
            auto_increment,
        });
    }
    table_schema.primary_key = pk_columns.into_iter().map(|(_, name)| name).collect();

    let index_rows = sqlx::query_as::<_, IndexRow>(
        "SELECT name, \"unique\", origin FROM pragma_index_list(?1, ?2) ORDER BY name",
    )
    .bind(table)
    .bind(schema)
    .fetch_all(pool)
    .await?;

    for index in index_rows {
        // the primary key is already known from table_info
        if index.origin == "pk" {
            continue;
        }
        let columns = sqlx::query_scalar::<_, Option<String>>(
            "SELECT name FROM pragma_index_info(?1, ?2) ORDER BY seqno",
        )
        .bind(&index.name)
        .bind(schema)
        .fetch_all(pool)
        .await?;

        // expression indexes cannot be represented
        let Some(columns) = columns.into_iter().collect::<Option<Vec<_>>>() else {
            tracing::debug!(table, index = %index.name, "Skipping expression index");
            continue;
        };

        table_schema.indexes.push(RawIndex {
            name: index.name,
            columns,
            unique: index.is_unique != 0,
            backs_constraint: index.origin == "u",
        });
    }

    let fk_rows = sqlx::query_as::<_, ForeignKeyRow>(
        "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete \
         FROM pragma_foreign_key_list(?1, ?2) ORDER BY id, seq",
    )
    .bind(table)
    .bind(schema)
    .fetch_all(pool)
    .await?;

    let mut grouped: IndexMap<i64, (RawForeignKey, bool)> = IndexMap::new();
    for row in fk_rows {
        let (fk, implicit) = grouped.entry(row.id).or_insert_with(|| {
            (
                RawForeignKey {
                    name: String::new(),
                    columns: Vec::new(),
                    ref_table: row.ref_table,
                    ref_columns: Vec::new(),
                    on_delete: Some(row.on_delete),
                    on_update: Some(row.on_update),
                },
                false,
            )
        });
        fk.columns.push(row.column_name);
        match row.ref_column {
            Some(column) => fk.ref_columns.push(column),
            None => *implicit = true,
        }
    }

    for (_, (mut fk, implicit)) in grouped {
        // REFERENCES parent without a column list targets the parent's primary key
        if implicit {
            fk.ref_columns = primary_key_of(pool, schema, &fk.ref_table).await?;
        }
        // SQLite keeps no constraint names
        fk.name = get_foreign_key_name(Engine::Sqlite, table, &fk.columns);
        table_schema.foreign_keys.push(fk);
    }

    Ok(table_schema)
}

async fn declares_autoincrement(pool: &SqlitePool, schema: &str, table: &str) -> Result<bool> {
    let sql = format!(
        "SELECT sql FROM \"{}\".sqlite_master WHERE type = 'table' AND name = ?1",
        schema.replace('"', "\"\"")
    );
    let ddl = sqlx::query_scalar::<_, Option<String>>(&sql)
        .bind(table)
        .fetch_optional(pool)
        .await?
        .flatten()
        .unwrap_or_default();
    Ok(ddl.to_ascii_uppercase().contains("AUTOINCREMENT"))
}

async fn primary_key_of(pool: &SqlitePool, schema: &str, table: &str) -> Result<Vec<String>> {
    Ok(sqlx::query_scalar::<_, String>(
        "SELECT name FROM pragma_table_info(?1, ?2) WHERE pk > 0 ORDER BY pk",
    )
    .bind(table)
    .bind(schema)
    .fetch_all(pool)
    .await?)
}

pub(crate) async fn server_version(pool: &SqlitePool) -> Result<String> {
    Ok(sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
        .fetch_one(pool)
        .await?)
}

/// Decode by the storage class of each value, since declared types are advisory
pub(crate) fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (idx, column) in sqlx::Row::columns(row).iter().enumerate() {
        columns.push(sqlx::Column::name(column).to_string());
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => Value::Int(row.try_get_unchecked::<i64, _>(idx)?),
                "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(idx)?),
                "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
                _ => Value::Text(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        values.push(value);
    }

    Ok(Row { columns, values })
}
