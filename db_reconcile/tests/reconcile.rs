mod common;

use pretty_assertions::assert_eq;
use rstest::rstest;

use db_reconcile::db::connector::Value;
use db_reconcile::sync::PendingCounts;
use db_reconcile::{
    get_table_row_counts, sync_table_data, Connector, Error, OpContext, SchemaScope, SyncOptions,
};

use common::{count, items_table, sqlite_with, RecordingConnector};

/// Target with ids 1..=95 where ids 1..=5 carry a different name
async fn drifted_target() -> db_reconcile::DatabaseConnection {
    let target = items_table(95).await;
    target
        .execute("UPDATE items SET name = 'stale' WHERE id <= 5", &[])
        .await
        .unwrap();
    target
}

#[tokio::test]
async fn inserts_missing_and_updates_different_rows() {
    let ctx = OpContext::default();
    let source = items_table(100).await;
    let target = drifted_target().await;
    let options = SyncOptions::new(&["id"])
        .insert_missing(true)
        .update_different(true)
        .batch_size(3);

    let result = sync_table_data(&source, &target, &SchemaScope::default(), "items", &options, &ctx)
        .await
        .unwrap();

    assert_eq!((result.inserted, result.updated, result.deleted), (5, 5, 0));
    assert!(result.errors.is_empty());
    let row_diff = result.row_diff.unwrap();
    assert_eq!(row_diff.missing_in_target, Some(5));
    assert_eq!(row_diff.missing_in_source, Some(0));
    assert_eq!(count(&target, "items").await, 100);

    let again = sync_table_data(&source, &target, &SchemaScope::default(), "items", &options, &ctx)
        .await
        .unwrap();
    assert_eq!(again.pending, PendingCounts::default());
}

#[tokio::test]
async fn disabled_buckets_only_count() {
    let ctx = OpContext::default();
    let source = items_table(100).await;
    let target = RecordingConnector::new(drifted_target().await);
    target
        .inner()
        .execute("INSERT INTO items (id, name, qty) VALUES (500, 'orphan', 0)", &[])
        .await
        .unwrap();

    let result = sync_table_data(
        &source,
        &target,
        &SchemaScope::default(),
        "items",
        &SyncOptions::new(&["id"]),
        &ctx,
    )
    .await
    .unwrap();

    assert_eq!(target.mutations(), Vec::<String>::new());
    assert_eq!(result.applied(), 0);
    assert_eq!(
        result.pending,
        PendingCounts {
            insert: 5,
            update: 5,
            delete: 1,
        }
    );
    assert_eq!(result.skipped.len(), 3);
}

#[tokio::test]
async fn cancellation_between_batches_stops_writing() {
    let ctx = OpContext::default();
    let source = items_table(10).await;
    let target = RecordingConnector::new(items_table(0).await)
        .cancel_after(1, ctx.cancel_token().clone());
    let options = SyncOptions::new(&["id"]).insert_missing(true).batch_size(2);

    let result = sync_table_data(&source, &target, &SchemaScope::default(), "items", &options, &ctx)
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.inserted, 2);
    assert!(result.errors.is_empty());
    assert_eq!(result.pending.insert, 10);
    assert_eq!(target.transactions(), 1);
    assert_eq!(count(target.inner(), "items").await, 2);
}

#[tokio::test]
async fn updates_reread_source_values_per_batch() {
    let ctx = OpContext::default();
    let source = items_table(7).await;
    let target = RecordingConnector::new(items_table(7).await);
    target
        .inner()
        .execute("UPDATE items SET qty = 0", &[])
        .await
        .unwrap();
    let options = SyncOptions::new(&["id"]).update_different(true).batch_size(3);

    let result = sync_table_data(&source, &target, &SchemaScope::default(), "items", &options, &ctx)
        .await
        .unwrap();

    assert_eq!(result.updated, 7);
    assert_eq!(target.transactions(), 3);
    let updates: Vec<String> = target
        .mutations()
        .into_iter()
        .filter(|sql| sql.starts_with("UPDATE"))
        .collect();
    assert_eq!(updates.len(), 7);
    assert!(updates[0].ends_with("WHERE id IN (1)"), "{}", updates[0]);

    let again = sync_table_data(&source, &target, &SchemaScope::default(), "items", &options, &ctx)
        .await
        .unwrap();
    assert_eq!(again.pending, PendingCounts::default());
}

#[tokio::test]
async fn deletes_extra_rows() {
    let ctx = OpContext::default();
    let source = items_table(10).await;
    let target = items_table(12).await;
    let options = SyncOptions::new(&["id"]).delete_extra(true);

    let result = sync_table_data(&source, &target, &SchemaScope::default(), "items", &options, &ctx)
        .await
        .unwrap();
    assert_eq!(result.deleted, 2);
    assert_eq!(count(&target, "items").await, 10);
}

#[rstest]
#[case::nullable_key(&["code"])]
#[case::unknown_key(&["missing"])]
#[case::no_key(&[])]
#[tokio::test]
async fn key_problems_fail_before_any_query(#[case] keys: &[&str]) {
    let ctx = OpContext::default();
    let schema = ["CREATE TABLE items (id INTEGER PRIMARY KEY, code TEXT, qty INTEGER)"];
    let source = RecordingConnector::new(sqlite_with(&schema).await);
    let target = RecordingConnector::new(sqlite_with(&schema).await);

    let err = sync_table_data(
        &source,
        &target,
        &SchemaScope::default(),
        "items",
        &SyncOptions::new(keys).insert_missing(true),
        &ctx,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)), "{:?}", err);
    assert!(source.statements().is_empty());
    assert!(target.statements().is_empty());
}

#[tokio::test]
async fn duplicate_keys_are_rejected_before_writing() {
    let ctx = OpContext::default();
    let source = sqlite_with(&[
        "CREATE TABLE tags (label TEXT NOT NULL, weight INTEGER)",
        "INSERT INTO tags VALUES ('a', 1), ('a', 2)",
    ])
    .await;
    let target = RecordingConnector::new(
        sqlite_with(&["CREATE TABLE tags (label TEXT NOT NULL, weight INTEGER)"]).await,
    );

    let err = sync_table_data(
        &source,
        &target,
        &SchemaScope::default(),
        "tags",
        &SyncOptions::new(&["label"]).insert_missing(true),
        &ctx,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
    assert!(target.mutations().is_empty());
}

#[tokio::test]
async fn failing_batch_halts_the_table() {
    let ctx = OpContext::default();
    let source = sqlite_with(&[
        "CREATE TABLE stock (id INTEGER PRIMARY KEY, qty INTEGER NOT NULL)",
        "INSERT INTO stock VALUES (1, 5), (2, 5), (3, -1), (4, 5), (5, 5)",
    ])
    .await;
    let target = sqlite_with(&[
        "CREATE TABLE stock (id INTEGER PRIMARY KEY, qty INTEGER NOT NULL CHECK (qty >= 0))",
    ])
    .await;
    let options = SyncOptions::new(&["id"]).insert_missing(true).batch_size(2);

    let result = sync_table_data(&source, &target, &SchemaScope::default(), "stock", &options, &ctx)
        .await
        .unwrap();

    // batch [1, 2] commits, batch [3, 4] rolls back, batch [5] never runs
    assert_eq!(result.inserted, 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.is_partial());
    assert_eq!(count(&target, "stock").await, 2);
    assert!(matches!(
        result.into_result(),
        Err(Error::PartialFailure { succeeded: 2, failed: 1, .. })
    ));
}

#[tokio::test]
async fn composite_keys_compare_as_tuples() {
    let ctx = OpContext::default();
    let schema = "CREATE TABLE stays (guest TEXT NOT NULL, night INTEGER NOT NULL, room TEXT, \
                  PRIMARY KEY (guest, night))";
    let source = sqlite_with(&[
        schema,
        "INSERT INTO stays VALUES ('ada', 1, '101'), ('ada', 2, '102'), ('bob', 1, '201')",
    ])
    .await;
    let target = sqlite_with(&[schema, "INSERT INTO stays VALUES ('ada', 1, '999')"]).await;
    let options = SyncOptions::new(&["guest", "night"])
        .insert_missing(true)
        .update_different(true);

    let result = sync_table_data(&source, &target, &SchemaScope::default(), "stays", &options, &ctx)
        .await
        .unwrap();
    assert_eq!((result.inserted, result.updated), (2, 1));

    let rows = target
        .query("SELECT room FROM stays WHERE guest = ? AND night = ?", &[
            Value::from("ada"),
            Value::Int(1),
        ])
        .await
        .unwrap();
    assert_eq!(rows[0].values[0], Value::from("101"));
}

#[tokio::test]
async fn row_counts_cover_tables_on_either_side() {
    let ctx = OpContext::default();
    let source = items_table(10).await;
    source
        .execute("CREATE TABLE only_source (id INTEGER PRIMARY KEY)", &[])
        .await
        .unwrap();
    let target = items_table(8).await;
    target
        .execute("CREATE TABLE logs (line TEXT)", &[])
        .await
        .unwrap();

    let counts = get_table_row_counts(&source, &target, &SchemaScope::default(), &ctx)
        .await
        .unwrap();
    let tables: Vec<&str> = counts.iter().map(|c| c.table.as_str()).collect();
    assert_eq!(tables, vec!["items", "logs", "only_source"]);

    let items = &counts[0];
    assert_eq!((items.source_count, items.target_count), (10, 8));
    assert_eq!(items.missing_in_target, Some(2));
    assert_eq!(items.missing_in_source, Some(0));
    assert_eq!(counts[1].missing_in_target, None);
}
