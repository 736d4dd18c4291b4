mod common;

use pretty_assertions::assert_eq;

use db_reconcile::db::executor::{apply_migration, ApplyOptions};
use db_reconcile::schema::diff::DiffKind;
use db_reconcile::{compare_schemas, generate_migration_sql, Connector, OpContext};

use common::sqlite_with;

const SOURCE: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL DEFAULT '', age INTEGER)",
    "CREATE UNIQUE INDEX ux_users_email ON users (email)",
    "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users (id), total REAL)",
];

const TARGET: &[&str] = &[
    "CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR(50), legacy TEXT)",
    "CREATE TABLE products (id INTEGER PRIMARY KEY, title TEXT)",
    "INSERT INTO users (id, email, legacy) VALUES (1, 'ada@example.com', 'x'), (2, NULL, 'y')",
];

#[tokio::test]
async fn identical_schemas_have_empty_diff() {
    let ctx = OpContext::default();
    let a = sqlite_with(SOURCE).await;
    let b = sqlite_with(SOURCE).await;

    let diff = compare_schemas(&a, &b, None, None, &ctx).await.unwrap();
    assert!(diff.is_empty(), "unexpected items: {:#?}", diff.items);
    assert_eq!(diff.source_fingerprint, diff.target_fingerprint);
}

#[tokio::test]
async fn added_column_yields_single_alter() {
    let ctx = OpContext::default();
    let source = sqlite_with(&["CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)"]).await;
    let target = sqlite_with(&["CREATE TABLE users (id INTEGER PRIMARY KEY)"]).await;

    let diff = compare_schemas(&source, &target, None, None, &ctx).await.unwrap();
    assert_eq!(diff.items.len(), 1);
    assert_eq!(diff.items[0].kind, DiffKind::ColumnAdded);
    assert_eq!(diff.items[0].table, "users");

    let script = generate_migration_sql(&diff);
    assert_eq!(script, vec!["ALTER TABLE users ADD COLUMN name TEXT".to_string()]);
}

#[tokio::test]
async fn created_tables_precede_references_to_them() {
    let ctx = OpContext::default();
    let source = sqlite_with(&[
        "CREATE TABLE a_orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES z_customers (id))",
        "CREATE TABLE z_customers (id INTEGER PRIMARY KEY)",
    ])
    .await;
    let target = sqlite_with(&[]).await;

    let diff = compare_schemas(&source, &target, None, None, &ctx).await.unwrap();
    let script = generate_migration_sql(&diff);

    let created = script
        .iter()
        .position(|s| s.starts_with("CREATE TABLE z_customers"))
        .unwrap();
    for (i, sql) in script.iter().enumerate() {
        if sql.contains("REFERENCES z_customers") {
            assert!(i > created, "{} runs before z_customers exists", sql);
        }
    }
}

#[tokio::test]
async fn applying_the_diff_converges() {
    let ctx = OpContext::default();
    let source = sqlite_with(SOURCE).await;
    let target = sqlite_with(TARGET).await;

    let diff = compare_schemas(&source, &target, None, None, &ctx).await.unwrap();
    let kinds: Vec<DiffKind> = diff.items.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DiffKind::TableAdded,
            DiffKind::ColumnAdded,
            DiffKind::ColumnModified,
            DiffKind::ColumnRemoved,
            DiffKind::IndexAdded,
            DiffKind::TableRemoved,
        ]
    );
    // the users changes collapse into one rebuild
    assert!(diff.items[2].migration_sql.is_empty());

    let script = generate_migration_sql(&diff);
    let outcome = apply_migration(&target, &script, ApplyOptions::default(), &ctx).await;
    assert!(outcome.succeeded(), "{:?}", outcome);
    assert_eq!(outcome.applied_count, script.len());

    let after = compare_schemas(&source, &target, None, None, &ctx).await.unwrap();
    assert!(after.is_empty(), "remaining items: {:#?}", after.items);

    // rows survive the rebuild, NULLs filled from the new default
    let rows = target
        .query("SELECT id, email FROM users ORDER BY id", &[])
        .await
        .unwrap();
    let emails: Vec<Option<String>> = rows.iter().map(|r| r.values[1].to_text()).collect();
    assert_eq!(
        emails,
        vec![Some("ada@example.com".to_string()), Some(String::new())]
    );
}

#[tokio::test]
async fn primary_key_only_change_converges() {
    let ctx = OpContext::default();
    let source = sqlite_with(&[
        "CREATE TABLE tags (code TEXT NOT NULL, label TEXT, PRIMARY KEY (code))",
    ])
    .await;
    let target = sqlite_with(&[
        "CREATE TABLE tags (code TEXT NOT NULL, label TEXT)",
        "INSERT INTO tags (code, label) VALUES ('a', 'alpha'), ('b', 'beta')",
    ])
    .await;

    let diff = compare_schemas(&source, &target, None, None, &ctx).await.unwrap();
    assert_eq!(diff.items.len(), 1);
    assert_eq!(diff.items[0].kind, DiffKind::IndexAdded);
    assert!(diff.warnings.is_empty(), "{:?}", diff.warnings);

    let script = generate_migration_sql(&diff);
    let outcome = apply_migration(&target, &script, ApplyOptions::default(), &ctx).await;
    assert!(outcome.succeeded(), "{:?}", outcome);

    let after = compare_schemas(&source, &target, None, None, &ctx).await.unwrap();
    assert!(after.is_empty(), "remaining items: {:#?}", after.items);
    let rows = target.query("SELECT code FROM tags ORDER BY code", &[]).await.unwrap();
    assert_eq!(rows.len(), 2);
}
