//! Engine tags and identifier comparison rules

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Postgres,
    MySql,
    MariaDb,
    Sqlite,
}

impl Engine {
    /// MySQL and MariaDB share one SQL dialect for everything rendered here
    pub fn is_mysql_family(self) -> bool {
        matches!(self, Engine::MySql | Engine::MariaDb)
    }

    /// Whether DDL participates in transactions
    pub fn transactional_ddl(self) -> bool {
        matches!(self, Engine::Postgres | Engine::Sqlite)
    }

    /// Name comparison rules when nothing more specific is known about the server
    pub fn default_case_rules(self) -> CaseRules {
        match self {
            Engine::Postgres => CaseRules {
                tables: CaseRule::Sensitive,
                columns: CaseRule::Sensitive,
            },
            // lower_case_table_names = 0 is the Linux default
            Engine::MySql | Engine::MariaDb => CaseRules {
                tables: CaseRule::Sensitive,
                columns: CaseRule::Insensitive,
            },
            Engine::Sqlite => CaseRules {
                tables: CaseRule::Insensitive,
                columns: CaseRule::Insensitive,
            },
        }
    }

    /// Schema used when the caller does not name one
    pub fn default_schema(self) -> &'static str {
        match self {
            Engine::Postgres => "public",
            Engine::Sqlite => "main",
            Engine::MySql | Engine::MariaDb => "",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Engine::Postgres => "postgres",
            Engine::MySql => "mysql",
            Engine::MariaDb => "mariadb",
            Engine::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

impl FromStr for Engine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Engine::Postgres),
            "mysql" => Ok(Engine::MySql),
            "mariadb" => Ok(Engine::MariaDb),
            "sqlite" | "sqlite3" => Ok(Engine::Sqlite),
            other => Err(Error::Configuration(format!(
                "Unsupported database driver: {}",
                other
            ))),
        }
    }
}

/// How an engine compares one category of identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseRule {
    /// Names match only when byte-identical
    Sensitive,
    /// Names match after ASCII lowercasing
    Insensitive,
}

impl CaseRule {
    /// Comparison key for a name under this rule
    pub fn key(self, name: &str) -> String {
        match self {
            CaseRule::Sensitive => name.to_string(),
            CaseRule::Insensitive => name.to_ascii_lowercase(),
        }
    }

    /// Rule used when comparing names from two engines: insensitive wins
    pub fn combine(self, other: CaseRule) -> CaseRule {
        if self == CaseRule::Insensitive || other == CaseRule::Insensitive {
            CaseRule::Insensitive
        } else {
            CaseRule::Sensitive
        }
    }

    pub fn same(self, a: &str, b: &str) -> bool {
        self.key(a) == self.key(b)
    }
}

/// Engine-tagged name comparison rules for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRules {
    pub tables: CaseRule,
    pub columns: CaseRule,
}

impl CaseRules {
    pub fn combine(self, other: CaseRules) -> CaseRules {
        CaseRules {
            tables: self.tables.combine(other.tables),
            columns: self.columns.combine(other.columns),
        }
    }

    /// Rules for MySQL given `@@lower_case_table_names`
    pub fn mysql(lower_case_table_names: i64) -> CaseRules {
        CaseRules {
            tables: if lower_case_table_names == 0 {
                CaseRule::Sensitive
            } else {
                CaseRule::Insensitive
            },
            columns: CaseRule::Insensitive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("postgres", Engine::Postgres)]
    #[case("PostgreSQL", Engine::Postgres)]
    #[case("mysql", Engine::MySql)]
    #[case("mariadb", Engine::MariaDb)]
    #[case("sqlite", Engine::Sqlite)]
    fn parses_driver_names(#[case] input: &str, #[case] expected: Engine) {
        assert_eq!(input.parse::<Engine>().unwrap(), expected);
    }

    #[test]
    fn postgres_against_mysql_tables_stay_sensitive_columns_fold() {
        let pg = Engine::Postgres.default_case_rules();
        let my = CaseRules::mysql(0);
        let rules = pg.combine(my);
        assert_eq!(rules.tables, CaseRule::Sensitive);
        assert_eq!(rules.columns, CaseRule::Insensitive);
        assert!(!rules.tables.same("Users", "users"));
        assert!(rules.columns.same("Email", "email"));
    }

    #[test]
    fn mysql_with_lowercased_table_names_folds_tables() {
        let rules = Engine::Postgres
            .default_case_rules()
            .combine(CaseRules::mysql(1));
        assert!(rules.tables.same("Users", "users"));
    }

    #[test]
    fn sqlite_folds_everything() {
        let rules = Engine::Sqlite.default_case_rules();
        assert!(rules.tables.same("ORDERS", "orders"));
        assert!(rules.columns.same("Id", "ID"));
    }
}
