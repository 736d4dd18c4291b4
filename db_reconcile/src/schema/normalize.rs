//! Raw engine metadata into the logical model
//!
//! Type names, default expressions and referential actions are reported differently by
//! every engine; this module maps them onto one vocabulary so that equal structures
//! compare equal across engines.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::db::connector::{RawColumn, RawForeignKey, RawIndex, TableSchema};
use crate::db::engine::Engine;
use crate::schema::types::{
    ColumnDef, ForeignKeyDef, IndexDef, LogicalType, PrimaryKey, ReferentialAction, TableDef,
};

static TYPE_MODIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)").expect("valid regex"));

static PG_CAST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"::\s*"?[a-z_][a-z0-9_ ]*"?(\(\s*\d+(\s*,\s*\d+)?\s*\))?(\[\])?"#)
        .expect("valid regex")
});

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid regex"));

static CURRENT_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(now\(\)|current_timestamp(\(\s*\d*\s*\))?|localtimestamp(\(\s*\d*\s*\))?|transaction_timestamp\(\))$")
        .expect("valid regex")
});

/// Map an engine type name onto the logical taxonomy
pub fn normalize_type(engine: Engine, raw: &str) -> LogicalType {
    let lowered = raw.trim().to_ascii_lowercase();
    let unmapped = || LogicalType::Unmapped(raw.trim().to_string());

    if lowered.ends_with("[]") || lowered.contains(" unsigned") || lowered.contains("zerofill") {
        return unmapped();
    }

    let (length, scale) = match TYPE_MODIFIER.captures(&lowered) {
        Some(caps) => (
            caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()),
            caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()),
        ),
        None => (None, None),
    };
    let base = TYPE_MODIFIER.replace(&lowered, "");
    let base = base.split_whitespace().collect::<Vec<_>>().join(" ");

    match base.as_str() {
        "tinyint" if engine.is_mysql_family() && length == Some(1) => LogicalType::Boolean,
        "smallint" | "int2" | "tinyint" | "smallserial" => LogicalType::SmallInt,
        "integer" | "int" | "int4" | "mediumint" | "serial" => LogicalType::Integer,
        "bigint" | "int8" | "bigserial" => LogicalType::BigInt,
        "real" | "float4" => LogicalType::Real,
        "float" if engine.is_mysql_family() => LogicalType::Real,
        "double precision" | "double" | "float8" | "float" => LogicalType::Double,
        "numeric" | "decimal" => LogicalType::Decimal {
            precision: length,
            scale,
        },
        "boolean" | "bool" => LogicalType::Boolean,
        "char" | "character" | "bpchar" | "nchar" => LogicalType::Char(length),
        "varchar" | "character varying" | "nvarchar" | "varchar2" => LogicalType::Varchar(length),
        "text" | "tinytext" | "mediumtext" | "longtext" | "clob" => LogicalType::Text,
        "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
            LogicalType::Binary
        }
        "date" => LogicalType::Date,
        "time" | "time without time zone" => LogicalType::Time,
        "timestamp" | "timestamp without time zone" | "datetime" => LogicalType::Timestamp,
        "timestamptz" | "timestamp with time zone" => LogicalType::TimestampTz,
        "json" | "jsonb" => LogicalType::Json,
        "uuid" => LogicalType::Uuid,
        _ => unmapped(),
    }
}

/// Normalize a default expression.
///
/// Returns the canonical expression and whether the default is really a sequence or
/// identity generator, in which case the column is auto-increment and has no default.
pub fn normalize_default(
    engine: Engine,
    raw: Option<&str>,
    data_type: &LogicalType,
) -> (Option<String>, bool) {
    let Some(raw) = raw.map(str::trim).filter(|d| !d.is_empty()) else {
        return (None, false);
    };

    if raw.to_ascii_lowercase().starts_with("nextval(") {
        return (None, true);
    }

    let mut expr = raw.to_string();
    if engine == Engine::Postgres {
        expr = PG_CAST.replace_all(&expr, "").trim().to_string();
    }
    expr = strip_outer_parens(&expr).to_string();

    let lowered = expr.to_ascii_lowercase();
    if lowered == "null" {
        return (None, false);
    }
    if CURRENT_TIMESTAMP.is_match(&lowered) {
        return (Some("CURRENT_TIMESTAMP".to_string()), false);
    }
    if matches!(lowered.as_str(), "current_date" | "curdate()") {
        return (Some("CURRENT_DATE".to_string()), false);
    }

    if *data_type == LogicalType::Boolean {
        match unquote(&lowered).as_deref().unwrap_or(lowered.as_str()) {
            "true" | "t" | "1" | "b'1'" => return (Some("TRUE".to_string()), false),
            "false" | "f" | "0" | "b'0'" => return (Some("FALSE".to_string()), false),
            _ => {}
        }
    }

    if data_type.is_numeric() {
        let literal = unquote(&expr).unwrap_or_else(|| expr.clone());
        if NUMBER.is_match(&literal) {
            return (Some(canonical_number(&literal)), false);
        }
        return (Some(expr), false);
    }

    if let Some(text) = unquote(&expr) {
        return (Some(quote(&text)), false);
    }

    // MySQL reports string defaults without quotes; MariaDB quotes them
    if engine == Engine::MySql && !looks_like_expression(&expr) {
        return (Some(quote(&expr)), false);
    }

    (Some(expr), false)
}

/// Map an engine referential rule onto the logical enum
pub fn referential_action(raw: Option<&str>) -> ReferentialAction {
    let Some(raw) = raw else {
        return ReferentialAction::NoAction;
    };
    // PostgreSQL reports single-letter codes
    match raw.trim().to_ascii_uppercase().as_str() {
        "R" | "RESTRICT" => ReferentialAction::Restrict,
        "C" | "CASCADE" => ReferentialAction::Cascade,
        "N" | "SET NULL" => ReferentialAction::SetNull,
        "D" | "SET DEFAULT" => ReferentialAction::SetDefault,
        _ => ReferentialAction::NoAction,
    }
}

pub fn normalize_column(engine: Engine, raw: &RawColumn) -> ColumnDef {
    let data_type = normalize_type(engine, &raw.data_type);
    let (default, generated) = normalize_default(engine, raw.default.as_deref(), &data_type);
    ColumnDef {
        name: raw.name.clone(),
        data_type,
        raw_type: raw.data_type.clone(),
        nullable: raw.nullable,
        default,
        auto_increment: raw.auto_increment || generated,
        ordinal_position: raw.ordinal_position,
    }
}

fn normalize_index(raw: &RawIndex) -> IndexDef {
    IndexDef {
        name: raw.name.clone(),
        columns: raw.columns.clone(),
        unique: raw.unique,
        backs_constraint: raw.backs_constraint,
    }
}

fn normalize_foreign_key(raw: &RawForeignKey) -> ForeignKeyDef {
    ForeignKeyDef {
        name: raw.name.clone(),
        columns: raw.columns.clone(),
        ref_table: raw.ref_table.clone(),
        ref_columns: raw.ref_columns.clone(),
        on_delete: referential_action(raw.on_delete.as_deref()),
        on_update: referential_action(raw.on_update.as_deref()),
    }
}

/// Normalize one introspected table
pub fn normalize_table(engine: Engine, raw: &TableSchema) -> TableDef {
    let mut columns: Vec<ColumnDef> = raw
        .columns
        .iter()
        .map(|c| normalize_column(engine, c))
        .collect();
    columns.sort_by_key(|c| c.ordinal_position);

    let primary_key = (!raw.primary_key.is_empty()).then(|| PrimaryKey {
        name: raw.primary_key_name.clone(),
        columns: raw.primary_key.clone(),
    });

    let foreign_keys: Vec<ForeignKeyDef> = raw.foreign_keys.iter().map(normalize_foreign_key).collect();

    let mut indexes: Vec<IndexDef> = raw
        .indexes
        .iter()
        // MySQL creates an index named after each foreign key that lacks one
        .filter(|idx| {
            !(engine.is_mysql_family()
                && !idx.unique
                && foreign_keys
                    .iter()
                    .any(|fk| fk.name == idx.name && idx.columns.starts_with(&fk.columns)))
        })
        .map(normalize_index)
        .collect();
    indexes.sort_by(|a, b| a.name.cmp(&b.name));

    TableDef {
        name: raw.name.clone(),
        columns,
        primary_key,
        indexes,
        foreign_keys,
    }
}

fn strip_outer_parens(expr: &str) -> &str {
    let mut current = expr.trim();
    while current.starts_with('(') && current.ends_with(')') && encloses_all(current) {
        current = current[1..current.len() - 1].trim();
    }
    current
}

/// Whether the first '(' closes at the very last character
fn encloses_all(expr: &str) -> bool {
    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, c) in expr.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == expr.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

fn unquote(expr: &str) -> Option<String> {
    let inner = expr.strip_prefix('\'')?.strip_suffix('\'')?;
    // '' inside the literal is an escaped quote; a lone quote means two literals
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
            } else {
                return None;
            }
        }
        out.push(c);
    }
    Some(out)
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn canonical_number(literal: &str) -> String {
    let trimmed = literal.trim_start_matches('+');
    if trimmed.contains('.') && !trimmed.contains(['e', 'E']) {
        let stripped = trimmed.trim_end_matches('0').trim_end_matches('.');
        if stripped.is_empty() || stripped == "-" {
            return "0".to_string();
        }
        return stripped.to_string();
    }
    trimmed.to_string()
}

fn looks_like_expression(expr: &str) -> bool {
    expr.contains('(') || NUMBER.is_match(expr)
}
