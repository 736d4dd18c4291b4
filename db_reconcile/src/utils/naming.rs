//! Naming utilities
//!
//! Generated object names, identifier limits and identifier quoting.

use crate::db::engine::Engine;

/// Format a name according to a pattern with placeholders
pub fn format_name(pattern: &str, replacements: &[(&str, &str)]) -> String {
    let mut result = pattern.to_string();

    for (placeholder, value) in replacements {
        result = result.replace(&format!("{{{}}}", placeholder), value);
    }

    result
}

/// Get index name from table and columns, fitted to the engine's limit
pub fn get_index_name(engine: Engine, table_name: &str, columns: &[String], unique: bool) -> String {
    let pattern = if unique {
        "ux_{table}_{columns}"
    } else {
        "ix_{table}_{columns}"
    };
    let name = format_name(pattern, &[("table", table_name), ("columns", &columns.join("_"))]);
    truncate_identifier(&name, get_max_identifier_length(engine))
}

/// Get foreign key constraint name, fitted to the engine's limit
pub fn get_foreign_key_name(engine: Engine, table_name: &str, columns: &[String]) -> String {
    let name = format_name(
        "fk_{table}_{columns}",
        &[("table", table_name), ("columns", &columns.join("_"))],
    );
    truncate_identifier(&name, get_max_identifier_length(engine))
}

/// Truncate an identifier to fit database limits
///
/// Long names keep a prefix and gain an 8 character md5 suffix so distinct inputs stay
/// distinct.
pub fn truncate_identifier(name: &str, max_length: usize) -> String {
    if name.len() <= max_length {
        return name.to_string();
    }

    // room for '_' plus 8 hash characters
    let mut keep_length = max_length.saturating_sub(9);
    while !name.is_char_boundary(keep_length) {
        keep_length -= 1;
    }

    let hash = format!("{:x}", md5::compute(name.as_bytes()));
    format!("{}_{}", &name[..keep_length], &hash[0..8])
}

/// Get maximum identifier length for specific database
pub fn get_max_identifier_length(engine: Engine) -> usize {
    match engine {
        Engine::Postgres => 63,
        Engine::MySql | Engine::MariaDb => 64,
        Engine::Sqlite => 2048,
    }
}

/// Always-quoted identifier in the engine's style
pub fn format_sql_identifier(name: &str, engine: Engine) -> String {
    match engine {
        Engine::MySql | Engine::MariaDb => format!("`{}`", name.replace('`', "``")),
        Engine::Postgres | Engine::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

/// Whether a name survives unquoted with its spelling intact
fn is_plain_identifier(name: &str, engine: Engine) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    // PostgreSQL folds unquoted names to lower case
    let allowed = |c: char| match engine {
        Engine::Postgres => c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_',
        _ => c.is_ascii_alphanumeric() || c == '_',
    };
    (first == '_' || first.is_ascii_alphabetic())
        && allowed(first)
        && chars.all(allowed)
}

/// Check if a name is a reserved SQL keyword
pub fn is_sql_keyword(name: &str) -> bool {
    // Common SQL keywords across databases
    const SQL_KEYWORDS: &[&str] = &[
        "add", "all", "alter", "analyze", "and", "any", "as", "asc", "begin", "between",
        "by", "case", "check", "collate", "column", "constraint", "create", "cross",
        "current_date", "current_time", "current_timestamp", "database", "default",
        "delete", "desc", "distinct", "drop", "else", "end", "except", "exists", "false",
        "foreign", "from", "full", "group", "having", "in", "index", "inner", "insert",
        "intersect", "into", "is", "join", "key", "left", "like", "limit", "natural", "not",
        "null", "offset", "on", "or", "order", "outer", "primary", "references", "right",
        "rows", "select", "set", "table", "then", "to", "true", "union", "unique",
        "update", "user", "using", "values", "view", "when", "where", "with",
    ];

    SQL_KEYWORDS.contains(&name.to_lowercase().as_str())
}

/// Quote an identifier only when it needs quoting
pub fn escape_identifier(name: &str, engine: Engine) -> String {
    if is_plain_identifier(name, engine) && !is_sql_keyword(name) {
        name.to_string()
    } else {
        format_sql_identifier(name, engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_name() {
        assert_eq!(
            format_name("ix_{table}_{columns}", &[("table", "users"), ("columns", "email")]),
            "ix_users_email"
        );
    }

    #[test]
    fn test_index_name() {
        assert_eq!(
            get_index_name(Engine::Postgres, "users", &["email".to_string()], true),
            "ux_users_email"
        );
        assert_eq!(
            get_index_name(
                Engine::MySql,
                "orders",
                &["customer_id".to_string(), "order_date".to_string()],
                false
            ),
            "ix_orders_customer_id_order_date"
        );
    }

    #[test]
    fn test_foreign_key_name() {
        assert_eq!(
            get_foreign_key_name(Engine::Sqlite, "posts", &["author_id".to_string()]),
            "fk_posts_author_id"
        );
    }

    #[test]
    fn test_truncate_identifier() {
        let long_name = "this_is_a_very_long_identifier_that_exceeds_database_limits";
        let truncated = truncate_identifier(long_name, 30);

        assert_eq!(truncated.len(), 30);
        assert!(truncated.starts_with("this_is_a_very_long"));
        assert_ne!(truncated, truncate_identifier(&format!("{}_2", long_name), 30));
    }

    #[test]
    fn test_truncate_keeps_char_boundaries() {
        let truncated = truncate_identifier(&"é".repeat(40), 20);
        assert!(truncated.len() <= 20);
    }

    #[test]
    fn test_is_sql_keyword() {
        assert!(is_sql_keyword("SELECT"));
        assert!(is_sql_keyword("order"));
        assert!(!is_sql_keyword("username"));
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("users", Engine::Postgres), "users");
        assert_eq!(escape_identifier("Users", Engine::Postgres), "\"Users\"");
        assert_eq!(escape_identifier("Users", Engine::MySql), "Users");
        assert_eq!(escape_identifier("order", Engine::MySql), "`order`");
        assert_eq!(escape_identifier("first name", Engine::Sqlite), "\"first name\"");
        assert_eq!(escape_identifier("a\"b", Engine::Sqlite), "\"a\"\"b\"");
    }
}
