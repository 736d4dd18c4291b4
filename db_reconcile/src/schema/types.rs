//! Type definitions for normalized schema objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::engine::{CaseRules, Engine};

/// Engine-independent column type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    Boolean,
    Char(Option<u32>),
    Varchar(Option<u32>),
    Text,
    Binary,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    Uuid,
    /// No logical equivalent; the raw engine type is kept verbatim
    Unmapped(String),
}

impl LogicalType {
    pub fn is_integer(&self) -> bool {
        matches!(self, LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                LogicalType::Real | LogicalType::Double | LogicalType::Decimal { .. }
            )
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            LogicalType::Char(_) | LogicalType::Varchar(_) | LogicalType::Text
        )
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::SmallInt => f.write_str("SMALLINT"),
            LogicalType::Integer => f.write_str("INTEGER"),
            LogicalType::BigInt => f.write_str("BIGINT"),
            LogicalType::Real => f.write_str("REAL"),
            LogicalType::Double => f.write_str("DOUBLE PRECISION"),
            LogicalType::Decimal {
                precision: Some(p),
                scale: Some(s),
            } => write!(f, "DECIMAL({},{})", p, s),
            LogicalType::Decimal {
                precision: Some(p),
                scale: None,
            } => write!(f, "DECIMAL({})", p),
            LogicalType::Decimal { .. } => f.write_str("DECIMAL"),
            LogicalType::Boolean => f.write_str("BOOLEAN"),
            LogicalType::Char(Some(n)) => write!(f, "CHAR({})", n),
            LogicalType::Char(None) => f.write_str("CHAR"),
            LogicalType::Varchar(Some(n)) => write!(f, "VARCHAR({})", n),
            LogicalType::Varchar(None) => f.write_str("VARCHAR"),
            LogicalType::Text => f.write_str("TEXT"),
            LogicalType::Binary => f.write_str("BLOB"),
            LogicalType::Date => f.write_str("DATE"),
            LogicalType::Time => f.write_str("TIME"),
            LogicalType::Timestamp => f.write_str("TIMESTAMP"),
            LogicalType::TimestampTz => f.write_str("TIMESTAMPTZ"),
            LogicalType::Json => f.write_str("JSON"),
            LogicalType::Uuid => f.write_str("UUID"),
            LogicalType::Unmapped(raw) => f.write_str(raw),
        }
    }
}

/// Normalized ON DELETE / ON UPDATE behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// Represents a database column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: LogicalType,
    /// Type exactly as the engine reported it
    pub raw_type: String,
    pub nullable: bool,
    /// Normalized default expression
    pub default: Option<String>,
    pub auto_increment: bool,
    pub ordinal_position: u32,
}

impl ColumnDef {
    /// Create a new nullable column with the given name and type
    pub fn new(name: &str, data_type: LogicalType) -> Self {
        Self {
            name: name.to_string(),
            raw_type: data_type.to_string(),
            data_type,
            nullable: true,
            default: None,
            auto_increment: false,
            ordinal_position: 0,
        }
    }

    /// Set whether the column is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set a default value for the column
    pub fn default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }

    pub fn unmapped(&self) -> bool {
        matches!(self.data_type, LogicalType::Unmapped(_))
    }
}

/// Represents a primary key constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Represents an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// Created by a UNIQUE constraint rather than CREATE INDEX
    pub backs_constraint: bool,
}

/// Represents a foreign key constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// Represents a database table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<PrimaryKey>,
    pub indexes: Vec<IndexDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableDef {
    /// Create a new table with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Find a column by name under the given comparison rule
    pub fn column(&self, name: &str, rules: &CaseRules) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| rules.columns.same(&c.name, name))
    }

    pub fn primary_key_columns(&self) -> &[String] {
        self.primary_key
            .as_ref()
            .map(|pk| pk.columns.as_slice())
            .unwrap_or(&[])
    }
}

/// A table that could not be introspected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionFailure {
    pub table: String,
    pub message: String,
}

/// Normalized structure of one schema at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub engine: Engine,
    pub schema: String,
    /// Rendered SQL must qualify names with `schema`
    pub qualify: bool,
    pub case_rules: CaseRules,
    /// Sorted by name
    pub tables: Vec<TableDef>,
    pub failures: Vec<IntrospectionFailure>,
    pub taken_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    pub fn new(engine: Engine, schema: &str) -> Self {
        Self {
            engine,
            schema: schema.to_string(),
            qualify: false,
            case_rules: engine.default_case_rules(),
            tables: Vec::new(),
            failures: Vec::new(),
            taken_at: Utc::now(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables
            .iter()
            .find(|t| self.case_rules.tables.same(&t.name, name))
    }

    pub fn failed(&self, name: &str) -> bool {
        self.failures
            .iter()
            .any(|f| self.case_rules.tables.same(&f.table, name))
    }

    /// Content hash over everything except the capture time
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Canonical<'a> {
            engine: Engine,
            schema: &'a str,
            tables: &'a [TableDef],
            failures: &'a [IntrospectionFailure],
        }

        let canonical = Canonical {
            engine: self.engine,
            schema: &self.schema,
            tables: &self.tables,
            failures: &self.failures,
        };
        // serializing plain data into a Vec cannot fail
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        format!("{:x}", md5::compute(bytes))
    }
}

/// Dependency phase a migration statement belongs to, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    DropForeignKey,
    DropIndex,
    CreateTable,
    AddColumn,
    AlterColumn,
    CreateIndex,
    AddForeignKey,
    DropColumn,
    DropTable,
}

/// One rendered DDL statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatement {
    pub phase: Phase,
    pub sql: String,
}

impl MigrationStatement {
    pub fn new(phase: Phase, sql: impl Into<String>) -> Self {
        Self {
            phase,
            sql: sql.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot::new(Engine::Sqlite, "main");
        let mut users = TableDef::new("users");
        users.columns.push(ColumnDef::new("id", LogicalType::Integer).nullable(false));
        snapshot.tables.push(users);
        snapshot
    }

    #[test]
    fn fingerprint_ignores_capture_time() {
        let a = snapshot();
        let mut b = snapshot();
        b.taken_at = a.taken_at + chrono::Duration::hours(1);
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.tables[0].columns[0].nullable = true;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn table_lookup_follows_case_rules() {
        let snapshot = snapshot();
        assert!(snapshot.table("USERS").is_some());
    }

    #[test]
    fn phases_sort_in_execution_order() {
        assert!(Phase::DropForeignKey < Phase::CreateTable);
        assert!(Phase::CreateTable < Phase::AddForeignKey);
        assert!(Phase::DropColumn < Phase::DropTable);
    }
}
