mod common;

use pretty_assertions::assert_eq;

use db_reconcile::sync::{sync_group_table, Member, TargetState};
use db_reconcile::{
    get_group_sync_status, Config, Connector, DatabaseConnection, Error, GroupChecks, OpContext,
    ReconcileClient, SnapshotCache, SyncOptions,
};
use std::time::Duration;

use common::{count, items_table};

fn member<'a>(name: &'a str, conn: &'a DatabaseConnection) -> Member<'a> {
    Member::new(name, conn, None)
}

const FLEET: &str = r#"
    [connections.primary]
    driver = "sqlite"
    url = "sqlite::memory:"

    [connections.ok]
    driver = "sqlite"
    url = "sqlite::memory:"

    [connections.down]
    driver = "sqlite"
    url = "sqlite:///no/such/dir/x.db"
    timeout_seconds = 5

    [groups.fleet]
    source = "primary"
    targets = ["ok", "down"]
"#;

fn fleet() -> ReconcileClient {
    let config: Config = toml::from_str(FLEET).unwrap();
    config.validate().unwrap();
    ReconcileClient::new(config)
}

#[tokio::test]
async fn reports_each_target_independently() {
    let ctx = OpContext::default();
    let source = items_table(20).await;
    let same = items_table(20).await;
    let behind = items_table(15).await;
    let gone = items_table(20).await;
    gone.disconnect().await;

    let targets = [
        member("same", &same),
        member("behind", &behind),
        member("gone", &gone),
    ];
    let cache = SnapshotCache::new(Duration::from_secs(60));
    let status = get_group_sync_status(
        member("primary", &source),
        &targets,
        GroupChecks::default(),
        2,
        Some(&cache),
        &ctx,
    )
    .await;

    assert_eq!(status.source, "primary");
    let states: Vec<(&str, TargetState)> = status
        .targets
        .iter()
        .map(|t| (t.target.as_str(), t.status))
        .collect();
    assert_eq!(
        states,
        vec![
            ("same", TargetState::InSync),
            ("behind", TargetState::OutOfSync),
            ("gone", TargetState::Error),
        ]
    );
    assert_eq!(status.targets[1].tables_out_of_sync, vec!["items".to_string()]);
    assert_eq!(status.targets[1].diff_items, 0);
    assert!(status.targets[2].error.is_some());
    assert!(!status.all_in_sync());
}

#[tokio::test]
async fn cancelled_context_leaves_targets_unchecked() {
    let ctx = OpContext::default();
    let source = items_table(3).await;
    let target = items_table(3).await;
    ctx.cancel();

    let status = get_group_sync_status(
        member("primary", &source),
        &[member("replica", &target)],
        GroupChecks::default(),
        4,
        None,
        &ctx,
    )
    .await;

    assert_eq!(status.targets.len(), 1);
    assert_eq!(status.targets[0].status, TargetState::Unchecked);
    assert!(status.targets[0].error.is_none());
}

#[tokio::test]
async fn syncs_table_on_every_target() {
    let ctx = OpContext::default();
    let source = items_table(10).await;
    let first = items_table(4).await;
    let second = items_table(10).await;
    let broken = items_table(1).await;
    broken
        .execute("DROP TABLE items", &[])
        .await
        .unwrap();

    let targets = [
        member("first", &first),
        member("second", &second),
        member("broken", &broken),
    ];
    let options = SyncOptions::new(&["id"]).insert_missing(true);
    let results = sync_group_table(member("primary", &source), &targets, "items", &options, 2, &ctx).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].status, TargetState::InSync);
    assert_eq!(results[0].result.as_ref().map(|r| r.inserted), Some(6));
    assert_eq!(results[1].result.as_ref().map(|r| r.inserted), Some(0));
    assert_eq!(results[2].status, TargetState::Error);
    assert!(results[2].error.is_some());
    assert_eq!(count(&first, "items").await, 10);
}

#[tokio::test]
async fn unreachable_member_fails_only_its_own_status() {
    let client = fleet();

    let status = client
        .get_group_sync_status("fleet", GroupChecks::default())
        .await
        .unwrap();

    let states: Vec<(&str, TargetState)> = status
        .targets
        .iter()
        .map(|t| (t.target.as_str(), t.status))
        .collect();
    assert_eq!(states, vec![("ok", TargetState::InSync), ("down", TargetState::Error)]);
    let error = status.targets[1].error.clone().unwrap_or_default();
    assert!(error.contains("fatal"), "{}", error);
}

#[tokio::test]
async fn unreachable_member_is_skipped_by_group_sync() {
    let client = fleet();
    let schema = "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, qty INTEGER)";
    let primary = client.connection("primary").await.unwrap();
    primary.execute(schema, &[]).await.unwrap();
    primary
        .execute("INSERT INTO items (id, name) VALUES (1, 'a'), (2, 'b')", &[])
        .await
        .unwrap();
    let ok = client.connection("ok").await.unwrap();
    ok.execute(schema, &[]).await.unwrap();

    let options = SyncOptions::new(&["id"]).insert_missing(true);
    let results = client.sync_group_table("fleet", "items", &options).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, TargetState::InSync);
    assert_eq!(results[0].result.as_ref().map(|r| r.inserted), Some(2));
    assert_eq!(results[1].target, "down");
    assert_eq!(results[1].status, TargetState::Error);
    assert_eq!(count(&ok, "items").await, 2);

    let err = client.connection("down").await.unwrap_err();
    assert!(matches!(err, Error::Connection { transient: false, .. }), "{:?}", err);
}
