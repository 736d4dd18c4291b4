//! Per-engine SQL rendering
//!
//! Everything that spells SQL differently between engines lives here: identifier
//! quoting, type names, default clauses, DDL statements and literal values.

use crate::db::engine::Engine;
use crate::schema::types::{
    ColumnDef, ForeignKeyDef, IndexDef, LogicalType, MigrationStatement, Phase, PrimaryKey,
    ReferentialAction, SchemaSnapshot, TableDef,
};
use crate::utils::naming::{escape_identifier, get_index_name};

/// Prefix of the scratch table used while rebuilding a SQLite table
pub const REBUILD_PREFIX: &str = "_rebuild_";

/// SQL writer for one engine, optionally qualifying names with a schema
#[derive(Debug, Clone)]
pub struct Dialect {
    engine: Engine,
    schema: Option<String>,
}

impl Dialect {
    pub fn new(engine: Engine, schema: Option<&str>) -> Self {
        Self {
            engine,
            schema: schema.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Dialect writing into the schema a snapshot was taken from
    pub fn for_snapshot(snapshot: &SchemaSnapshot) -> Self {
        Self::new(snapshot.engine, snapshot.qualify.then_some(snapshot.schema.as_str()))
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn ident(&self, name: &str) -> String {
        escape_identifier(name, self.engine)
    }

    fn idents(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.ident(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Possibly schema-qualified table name
    pub fn table(&self, name: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", self.ident(schema), self.ident(name)),
            None => self.ident(name),
        }
    }

    /// Index names live in the schema namespace on PostgreSQL and SQLite
    fn index_ref(&self, name: &str) -> String {
        match self.engine {
            Engine::MySql | Engine::MariaDb => self.ident(name),
            Engine::Postgres | Engine::Sqlite => self.table(name),
        }
    }

    /// Name an index will get when rendered; engine-internal names are regenerated
    pub fn index_name(&self, table: &str, index: &IndexDef) -> String {
        if index.name.is_empty() || index.name.starts_with("sqlite_autoindex_") {
            get_index_name(self.engine, table, &index.columns, index.unique)
        } else {
            index.name.clone()
        }
    }

    pub fn column_type(&self, column: &ColumnDef) -> String {
        match self.engine {
            Engine::Postgres => postgres_type(&column.data_type),
            Engine::MySql | Engine::MariaDb => mysql_type(&column.data_type),
            Engine::Sqlite if column.auto_increment && column.data_type.is_integer() => {
                "INTEGER".to_string()
            }
            Engine::Sqlite => column.data_type.to_string(),
        }
    }

    /// Literal-ness decides whether an expression default needs parentheses
    pub fn default_value(&self, expr: &str) -> String {
        let upper = expr.to_ascii_uppercase();
        let literal = expr.starts_with('\'')
            || expr.parse::<f64>().is_ok()
            || matches!(upper.as_str(), "TRUE" | "FALSE" | "NULL" | "CURRENT_TIMESTAMP");
        if literal {
            if self.engine.is_mysql_family() && expr.starts_with('\'') {
                return expr.replace('\\', "\\\\");
            }
            return expr.to_string();
        }
        match self.engine {
            Engine::Postgres => expr.to_string(),
            _ => format!("({})", expr),
        }
    }

    /// Column clause as used by CREATE TABLE and ADD COLUMN
    pub fn column_definition(&self, column: &ColumnDef) -> String {
        let mut def = format!("{} {}", self.ident(&column.name), self.column_type(column));
        match self.engine {
            Engine::Postgres => {
                if column.auto_increment {
                    def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
                }
                if !column.nullable {
                    def.push_str(" NOT NULL");
                }
                if let (Some(default), false) = (&column.default, column.auto_increment) {
                    def.push_str(&format!(" DEFAULT {}", self.default_value(default)));
                }
            }
            Engine::MySql | Engine::MariaDb => {
                def.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
                if let Some(default) = &column.default {
                    def.push_str(&format!(" DEFAULT {}", self.default_value(default)));
                }
                if column.auto_increment {
                    def.push_str(" AUTO_INCREMENT");
                }
            }
            Engine::Sqlite => {
                if !column.nullable {
                    def.push_str(" NOT NULL");
                }
                if let Some(default) = &column.default {
                    def.push_str(&format!(" DEFAULT {}", self.default_value(default)));
                }
            }
        }
        def
    }

    fn references(&self, fk: &ForeignKeyDef) -> String {
        let mut clause = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            self.idents(&fk.columns),
            self.table(&fk.ref_table),
            self.idents(&fk.ref_columns)
        );
        if fk.on_delete != ReferentialAction::NoAction {
            clause.push_str(&format!(" ON DELETE {}", fk.on_delete.as_sql()));
        }
        if fk.on_update != ReferentialAction::NoAction {
            clause.push_str(&format!(" ON UPDATE {}", fk.on_update.as_sql()));
        }
        clause
    }

    fn create_table_sql(&self, table: &TableDef, name: &str) -> String {
        let pk_columns = table.primary_key_columns();
        // SQLite AUTOINCREMENT only exists as an inline column constraint
        let inline_pk = match (self.engine, pk_columns) {
            (Engine::Sqlite, [only]) => table
                .columns
                .iter()
                .find(|c| &c.name == only && c.auto_increment && c.data_type.is_integer()),
            _ => None,
        };

        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|column| {
                let mut def = self.column_definition(column);
                if inline_pk.map_or(false, |pk| pk.name == column.name) {
                    def.push_str(" PRIMARY KEY AUTOINCREMENT");
                }
                def
            })
            .collect();

        if !pk_columns.is_empty() && inline_pk.is_none() {
            parts.push(format!("PRIMARY KEY ({})", self.idents(pk_columns)));
        }

        if self.engine == Engine::Sqlite {
            for fk in &table.foreign_keys {
                parts.push(format!("CONSTRAINT {} {}", self.ident(&fk.name), self.references(fk)));
            }
        }

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.table(name),
            parts.join(",\n    ")
        )
    }

    /// CREATE TABLE plus its indexes; foreign keys are added separately except on SQLite
    pub fn create_table(&self, table: &TableDef) -> Vec<MigrationStatement> {
        let mut statements = vec![MigrationStatement::new(
            Phase::CreateTable,
            self.create_table_sql(table, &table.name),
        )];
        for index in &table.indexes {
            statements.extend(self.create_index(&table.name, index));
        }
        if self.engine != Engine::Sqlite {
            for fk in &table.foreign_keys {
                statements.extend(self.add_foreign_key(&table.name, fk));
            }
        }
        statements
    }

    pub fn drop_table(&self, table: &TableDef) -> Vec<MigrationStatement> {
        let mut statements = Vec::new();
        if self.engine != Engine::Sqlite {
            for fk in &table.foreign_keys {
                statements.extend(self.drop_foreign_key(&table.name, fk));
            }
        }
        statements.push(MigrationStatement::new(
            Phase::DropTable,
            format!("DROP TABLE {}", self.table(&table.name)),
        ));
        statements
    }

    pub fn add_column(&self, table: &str, column: &ColumnDef) -> Vec<MigrationStatement> {
        vec![MigrationStatement::new(
            Phase::AddColumn,
            format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.table(table),
                self.column_definition(column)
            ),
        )]
    }

    pub fn drop_column(&self, table: &str, column: &str) -> Vec<MigrationStatement> {
        vec![MigrationStatement::new(
            Phase::DropColumn,
            format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.table(table),
                self.ident(column)
            ),
        )]
    }

    /// Multi-step column change.
    ///
    /// `touching_fks` are the foreign keys (with their owning table) that MySQL requires
    /// to be dropped around a MODIFY COLUMN; other engines ignore them.
    pub fn alter_column(
        &self,
        table: &str,
        before: &ColumnDef,
        after: &ColumnDef,
        touching_fks: &[(String, ForeignKeyDef)],
    ) -> Vec<MigrationStatement> {
        match self.engine {
            Engine::Postgres => self.alter_column_postgres(table, before, after),
            Engine::MySql | Engine::MariaDb => {
                let mut statements = Vec::new();
                for (owner, fk) in touching_fks {
                    statements.extend(self.drop_foreign_key(owner, fk));
                }
                statements.push(MigrationStatement::new(
                    Phase::AlterColumn,
                    format!(
                        "ALTER TABLE {} MODIFY COLUMN {}",
                        self.table(table),
                        self.column_definition(after)
                    ),
                ));
                for (owner, fk) in touching_fks {
                    statements.extend(self.add_foreign_key(owner, fk));
                }
                statements
            }
            // SQLite changes columns by rebuilding the table
            Engine::Sqlite => Vec::new(),
        }
    }

    fn alter_column_postgres(
        &self,
        table: &str,
        before: &ColumnDef,
        after: &ColumnDef,
    ) -> Vec<MigrationStatement> {
        let prefix = format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            self.table(table),
            self.ident(&before.name)
        );
        let alter = |sql: String| MigrationStatement::new(Phase::AlterColumn, sql);
        let mut statements = Vec::new();

        let type_changed = before.data_type != after.data_type;
        let mut default_dropped = false;

        if before.auto_increment && !after.auto_increment {
            statements.push(alter(format!("{} DROP IDENTITY IF EXISTS", prefix)));
            // serial columns carry a sequence default instead
            statements.push(alter(format!("{} DROP DEFAULT", prefix)));
            default_dropped = true;
        }

        if type_changed {
            if before.default.is_some() && !default_dropped {
                statements.push(alter(format!("{} DROP DEFAULT", prefix)));
                default_dropped = true;
            }
            let new_type = self.column_type(after);
            statements.push(alter(format!(
                "{} TYPE {} USING {}::{}",
                prefix,
                new_type,
                self.ident(&before.name),
                new_type
            )));
        }

        if before.nullable != after.nullable {
            let change = if after.nullable {
                "DROP NOT NULL"
            } else {
                "SET NOT NULL"
            };
            statements.push(alter(format!("{} {}", prefix, change)));
        }

        if !after.auto_increment {
            match &after.default {
                Some(default) if default_dropped || before.default.as_ref() != Some(default) => {
                    statements.push(alter(format!(
                        "{} SET DEFAULT {}",
                        prefix,
                        self.default_value(default)
                    )));
                }
                None if before.default.is_some() && !default_dropped => {
                    statements.push(alter(format!("{} DROP DEFAULT", prefix)));
                }
                _ => {}
            }
        }

        if after.auto_increment && !before.auto_increment {
            if before.default.is_some() && !default_dropped {
                statements.push(alter(format!("{} DROP DEFAULT", prefix)));
            }
            if before.nullable {
                statements.push(alter(format!("{} SET NOT NULL", prefix)));
            }
            statements.push(alter(format!(
                "{} ADD GENERATED BY DEFAULT AS IDENTITY",
                prefix
            )));
        }

        statements
    }

    pub fn create_index(&self, table: &str, index: &IndexDef) -> Vec<MigrationStatement> {
        let unique = if index.unique { "UNIQUE " } else { "" };
        vec![MigrationStatement::new(
            Phase::CreateIndex,
            format!(
                "CREATE {}INDEX {} ON {} ({})",
                unique,
                self.index_ref(&self.index_name(table, index)),
                self.target_of_index(table),
                self.idents(&index.columns)
            ),
        )]
    }

    // SQLite qualifies the index, never the table it is on
    fn target_of_index(&self, table: &str) -> String {
        match self.engine {
            Engine::Sqlite => self.ident(table),
            _ => self.table(table),
        }
    }

    pub fn drop_index(&self, table: &str, index: &IndexDef) -> Vec<MigrationStatement> {
        let sql = match self.engine {
            Engine::Postgres if index.backs_constraint => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.table(table),
                self.ident(&index.name)
            ),
            Engine::Postgres | Engine::Sqlite => {
                format!("DROP INDEX {}", self.index_ref(&index.name))
            }
            Engine::MySql | Engine::MariaDb => format!(
                "DROP INDEX {} ON {}",
                self.ident(&index.name),
                self.table(table)
            ),
        };
        vec![MigrationStatement::new(Phase::DropIndex, sql)]
    }

    /// Nothing on SQLite, where a key change rebuilds the table
    pub fn drop_primary_key(&self, table: &str, key: &PrimaryKey) -> Vec<MigrationStatement> {
        let sql = match self.engine {
            Engine::Postgres => {
                let name = key
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}_pkey", table));
                format!(
                    "ALTER TABLE {} DROP CONSTRAINT {}",
                    self.table(table),
                    self.ident(&name)
                )
            }
            Engine::MySql | Engine::MariaDb => {
                format!("ALTER TABLE {} DROP PRIMARY KEY", self.table(table))
            }
            Engine::Sqlite => return Vec::new(),
        };
        vec![MigrationStatement::new(Phase::DropIndex, sql)]
    }

    pub fn add_primary_key(&self, table: &str, columns: &[String]) -> Vec<MigrationStatement> {
        if self.engine == Engine::Sqlite || columns.is_empty() {
            return Vec::new();
        }
        vec![MigrationStatement::new(
            Phase::CreateIndex,
            format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                self.table(table),
                self.idents(columns)
            ),
        )]
    }

    pub fn add_foreign_key(&self, table: &str, fk: &ForeignKeyDef) -> Vec<MigrationStatement> {
        vec![MigrationStatement::new(
            Phase::AddForeignKey,
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {}",
                self.table(table),
                self.ident(&fk.name),
                self.references(fk)
            ),
        )]
    }

    pub fn drop_foreign_key(&self, table: &str, fk: &ForeignKeyDef) -> Vec<MigrationStatement> {
        let keyword = match self.engine {
            Engine::MySql | Engine::MariaDb => "FOREIGN KEY",
            _ => "CONSTRAINT",
        };
        vec![MigrationStatement::new(
            Phase::DropForeignKey,
            format!(
                "ALTER TABLE {} DROP {} {}",
                self.table(table),
                keyword,
                self.ident(&fk.name)
            ),
        )]
    }

    /// SQLite table rebuild: copy into a table of the desired shape and swap it in.
    ///
    /// Dropping the old table fires `ON DELETE` actions unless foreign key enforcement
    /// is off for the session; the executor takes care of that. `copy` pairs each desired column with the current column it is filled from.
    pub fn rebuild_table(
        &self,
        current: &str,
        desired: &TableDef,
        copy: &[(String, String)],
    ) -> Vec<MigrationStatement> {
        let scratch = format!("{}{}", REBUILD_PREFIX, current);
        let step = |sql: String| MigrationStatement::new(Phase::AlterColumn, sql);

        let mut statements = vec![step(self.create_table_sql(desired, &scratch))];

        if !copy.is_empty() {
            let targets: Vec<String> = copy.iter().map(|(to, _)| to.clone()).collect();
            let sources: Vec<String> = copy
                .iter()
                .map(|(to, from)| {
                    let column = desired.columns.iter().find(|c| &c.name == to);
                    match column {
                        // fill NULLs that the new NOT NULL would reject
                        Some(c) if !c.nullable && c.default.is_some() => format!(
                            "COALESCE({}, {})",
                            self.ident(from),
                            self.default_value(c.default.as_deref().unwrap_or("NULL"))
                        ),
                        _ => self.ident(from),
                    }
                })
                .collect();
            statements.push(step(format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                self.table(&scratch),
                self.idents(&targets),
                sources.join(", "),
                self.table(current)
            )));
        }

        statements.push(step(format!("DROP TABLE {}", self.table(current))));
        statements.push(step(format!(
            "ALTER TABLE {} RENAME TO {}",
            self.table(&scratch),
            self.ident(current)
        )));
        for index in &desired.indexes {
            statements.extend(
                self.create_index(current, index)
                    .into_iter()
                    .map(|s| step(s.sql)),
            );
        }
        statements
    }

    /// Select expression yielding a column's value as text
    pub fn text_select(&self, column: &str, data_type: &LogicalType) -> String {
        let col = self.ident(column);
        match (self.engine, data_type) {
            (Engine::Postgres, LogicalType::Boolean) => format!("({}::int)::text", col),
            (Engine::Postgres, LogicalType::Binary) => format!("encode({}, 'hex')", col),
            (Engine::Postgres, _) => format!("{}::text", col),
            (Engine::MySql | Engine::MariaDb, LogicalType::Binary) => {
                format!("LOWER(HEX({}))", col)
            }
            (Engine::MySql | Engine::MariaDb, _) => format!("CAST({} AS CHAR)", col),
            (Engine::Sqlite, LogicalType::Binary) => format!("lower(hex({}))", col),
            (Engine::Sqlite, _) => format!("CAST({} AS TEXT)", col),
        }
    }

    /// Quoted string literal
    pub fn quote_literal(&self, text: &str) -> String {
        let escaped = text.replace('\'', "''");
        if self.engine.is_mysql_family() {
            format!("'{}'", escaped.replace('\\', "\\\\"))
        } else {
            format!("'{}'", escaped)
        }
    }

    /// Literal for a value read through `text_select`
    pub fn value_literal(&self, value: Option<&str>, data_type: &LogicalType) -> String {
        let Some(text) = value else {
            return "NULL".to_string();
        };
        match (self.engine, data_type) {
            (Engine::Postgres, LogicalType::Binary) => {
                format!("decode({}, 'hex')", self.quote_literal(text))
            }
            (_, LogicalType::Binary) if text.chars().all(|c| c.is_ascii_hexdigit()) => {
                format!("X'{}'", text)
            }
            (Engine::Postgres, LogicalType::Boolean) => match text {
                "1" | "t" | "true" => "TRUE".to_string(),
                "0" | "f" | "false" => "FALSE".to_string(),
                other => self.quote_literal(other),
            },
            (_, t) if t.is_integer() && text.parse::<i64>().is_ok() => text.to_string(),
            _ => self.quote_literal(text),
        }
    }
}

fn postgres_type(data_type: &LogicalType) -> String {
    match data_type {
        LogicalType::SmallInt => "smallint".into(),
        LogicalType::Integer => "integer".into(),
        LogicalType::BigInt => "bigint".into(),
        LogicalType::Real => "real".into(),
        LogicalType::Double => "double precision".into(),
        LogicalType::Decimal {
            precision: Some(p),
            scale,
        } => format!("numeric({},{})", p, scale.unwrap_or(0)),
        LogicalType::Decimal { .. } => "numeric".into(),
        LogicalType::Boolean => "boolean".into(),
        LogicalType::Char(Some(n)) => format!("character({})", n),
        LogicalType::Char(None) => "character".into(),
        LogicalType::Varchar(Some(n)) => format!("character varying({})", n),
        LogicalType::Varchar(None) => "character varying".into(),
        LogicalType::Text => "text".into(),
        LogicalType::Binary => "bytea".into(),
        LogicalType::Date => "date".into(),
        LogicalType::Time => "time without time zone".into(),
        LogicalType::Timestamp => "timestamp without time zone".into(),
        LogicalType::TimestampTz => "timestamp with time zone".into(),
        LogicalType::Json => "jsonb".into(),
        LogicalType::Uuid => "uuid".into(),
        LogicalType::Unmapped(raw) => raw.clone(),
    }
}

fn mysql_type(data_type: &LogicalType) -> String {
    match data_type {
        LogicalType::SmallInt => "smallint".into(),
        LogicalType::Integer => "int".into(),
        LogicalType::BigInt => "bigint".into(),
        LogicalType::Real => "float".into(),
        LogicalType::Double => "double".into(),
        LogicalType::Decimal {
            precision: Some(p),
            scale,
        } => format!("decimal({},{})", p, scale.unwrap_or(0)),
        LogicalType::Decimal { .. } => "decimal(65,30)".into(),
        LogicalType::Boolean => "tinyint(1)".into(),
        LogicalType::Char(n) => format!("char({})", n.unwrap_or(1)),
        LogicalType::Varchar(n) => format!("varchar({})", n.unwrap_or(255)),
        LogicalType::Text => "text".into(),
        LogicalType::Binary => "longblob".into(),
        LogicalType::Date => "date".into(),
        LogicalType::Time => "time".into(),
        LogicalType::Timestamp | LogicalType::TimestampTz => "datetime".into(),
        LogicalType::Json => "json".into(),
        LogicalType::Uuid => "char(36)".into(),
        LogicalType::Unmapped(raw) => raw.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn users() -> TableDef {
        let mut table = TableDef::new("users");
        let mut id = ColumnDef::new("id", LogicalType::Integer).nullable(false);
        id.auto_increment = true;
        table.columns.push(id);
        table.columns.push(
            ColumnDef::new("status", LogicalType::Varchar(Some(20)))
                .nullable(false)
                .default("'active'"),
        );
        table.primary_key = Some(crate::schema::types::PrimaryKey {
            name: None,
            columns: vec!["id".into()],
        });
        table
    }

    #[test]
    fn postgres_create_table_uses_identity() {
        let dialect = Dialect::new(Engine::Postgres, None);
        let statements = dialect.create_table(&users());
        assert_eq!(
            statements[0].sql,
            "CREATE TABLE users (\n    id integer GENERATED BY DEFAULT AS IDENTITY NOT NULL,\n    \
             status character varying(20) NOT NULL DEFAULT 'active',\n    PRIMARY KEY (id)\n)"
        );
    }

    #[test]
    fn sqlite_autoincrement_is_inline() {
        let dialect = Dialect::new(Engine::Sqlite, None);
        let sql = &dialect.create_table(&users())[0].sql;
        assert!(sql.contains("id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT"));
        assert!(!sql.contains("PRIMARY KEY (id)"));
    }

    #[test]
    fn qualifies_tables_with_schema() {
        let dialect = Dialect::new(Engine::Postgres, Some("Sales"));
        assert_eq!(dialect.table("orders"), "\"Sales\".orders");
        let dialect = Dialect::new(Engine::MySql, Some("sales"));
        assert_eq!(dialect.table("order"), "sales.`order`");
    }

    #[test]
    fn postgres_type_change_drops_default_first() {
        let dialect = Dialect::new(Engine::Postgres, None);
        let before = ColumnDef::new("qty", LogicalType::Integer).default("0");
        let after = ColumnDef::new("qty", LogicalType::BigInt)
            .nullable(false)
            .default("0");
        let sql: Vec<String> = dialect
            .alter_column("items", &before, &after, &[])
            .into_iter()
            .map(|s| s.sql)
            .collect();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE items ALTER COLUMN qty DROP DEFAULT",
                "ALTER TABLE items ALTER COLUMN qty TYPE bigint USING qty::bigint",
                "ALTER TABLE items ALTER COLUMN qty SET NOT NULL",
                "ALTER TABLE items ALTER COLUMN qty SET DEFAULT 0",
            ]
        );
    }

    #[test]
    fn mysql_modify_wraps_touching_foreign_keys() {
        let dialect = Dialect::new(Engine::MySql, None);
        let fk = ForeignKeyDef {
            name: "fk_orders_user".into(),
            columns: vec!["user_id".into()],
            ref_table: "users".into(),
            ref_columns: vec!["id".into()],
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::NoAction,
        };
        let before = ColumnDef::new("user_id", LogicalType::Integer);
        let after = ColumnDef::new("user_id", LogicalType::BigInt);
        let statements = dialect.alter_column("orders", &before, &after, &[("orders".into(), fk)]);

        let phases: Vec<Phase> = statements.iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![Phase::DropForeignKey, Phase::AlterColumn, Phase::AddForeignKey]
        );
        assert_eq!(
            statements[1].sql,
            "ALTER TABLE orders MODIFY COLUMN user_id bigint NULL"
        );
        assert!(statements[2].sql.ends_with("ON DELETE CASCADE"));
    }

    #[test]
    fn drops_constraint_backed_index_as_constraint() {
        let dialect = Dialect::new(Engine::Postgres, None);
        let index = IndexDef {
            name: "users_email_key".into(),
            columns: vec!["email".into()],
            unique: true,
            backs_constraint: true,
        };
        assert_eq!(
            dialect.drop_index("users", &index)[0].sql,
            "ALTER TABLE users DROP CONSTRAINT users_email_key"
        );
    }

    #[test]
    fn regenerates_sqlite_internal_index_names() {
        let dialect = Dialect::new(Engine::Postgres, None);
        let index = IndexDef {
            name: "sqlite_autoindex_users_1".into(),
            columns: vec!["email".into()],
            unique: true,
            backs_constraint: true,
        };
        assert_eq!(
            dialect.create_index("users", &index)[0].sql,
            "CREATE UNIQUE INDEX ux_users_email ON users (email)"
        );
    }

    #[test]
    fn literals_escape_per_engine() {
        assert_eq!(Dialect::new(Engine::Postgres, None).quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(Dialect::new(Engine::MySql, None).quote_literal("a\\b"), "'a\\\\b'");
        assert_eq!(
            Dialect::new(Engine::Sqlite, None).value_literal(None, &LogicalType::Text),
            "NULL"
        );
    }

    #[test]
    fn integer_literals_stay_unquoted() {
        let dialect = Dialect::new(Engine::Postgres, None);
        assert_eq!(dialect.value_literal(Some("-42"), &LogicalType::BigInt), "-42");
        assert_eq!(dialect.value_literal(Some("4 2"), &LogicalType::Integer), "'4 2'");
        assert_eq!(dialect.value_literal(Some("42"), &LogicalType::Text), "'42'");
    }
}
