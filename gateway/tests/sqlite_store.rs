#![cfg(feature = "sqlite")]

use std::sync::Arc;

use crm_gateway::EntityGateway;
use crm_gateway::entity::Task;
use crm_gateway::entity::task::NewTask;
use crm_gateway::record::FailureKind;
use crm_gateway::record::FetchParams;
use crm_gateway::record::RemoteRecord;
use crm_gateway::store::RecordStore;
use crm_gateway::store::sqlite::SqliteRecordStore;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

fn rec(v: serde_json::Value) -> RemoteRecord {
    v.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn records_survive_reopening_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crm.db");

    let first: EntityGateway<Task> = EntityGateway::new(Arc::new(SqliteRecordStore::new(&path)));
    let created = first.create(&NewTask::titled("Persist me")).await.unwrap();
    first.set_completed(created.id, true).await.unwrap();
    drop(first);

    let reopened: EntityGateway<Task> =
        EntityGateway::new(Arc::new(SqliteRecordStore::new(&path)));
    let task = reopened.get_by_id(created.id).await.unwrap();
    assert_eq!(task.title, "Persist me");
    assert!(task.completed);
    assert!(task.completed_at.is_some());
}

#[tokio::test]
async fn tables_share_one_file_without_mixing_rows() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("crm.db"));
    store
        .create_records("a", vec![rec(json!({"x": 1}))], &[])
        .await
        .unwrap();
    store
        .create_records("b", vec![rec(json!({"x": 2})), rec(json!({"x": 3}))], &[])
        .await
        .unwrap();

    let a = store
        .fetch_records("a", &FetchParams::default())
        .await
        .unwrap();
    let b = store
        .fetch_records("b", &FetchParams::default())
        .await
        .unwrap();
    assert_eq!(a.data.map(|rows| rows.len()), Some(1));
    assert_eq!(b.data.map(|rows| rows.len()), Some(2));
}

#[tokio::test]
async fn unique_columns_are_enforced_inside_the_batch() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("crm.db"));
    let env = store
        .create_records(
            "lead_c",
            vec![
                rec(json!({"website_url_c": "acme.io"})),
                rec(json!({"website_url_c": "acme.io"})),
                rec(json!({"website_url_c": ""})),
                rec(json!({"website_url_c": ""})),
            ],
            &["website_url_c"],
        )
        .await
        .unwrap();
    let results = env.data.unwrap_or_default();
    let flags: Vec<_> = results.iter().map(|r| (r.success, r.failure)).collect();
    assert_eq!(
        flags,
        vec![
            (true, None),
            (false, Some(FailureKind::Conflict)),
            (true, None),
            (true, None),
        ]
    );
}

#[tokio::test]
async fn missing_rows_are_reported_per_record() {
    let dir = tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("crm.db"));
    let update = store
        .update_records("t", vec![rec(json!({"Id": 5, "x": 1}))], &[])
        .await
        .unwrap();
    assert_eq!(
        update.data.unwrap_or_default()[0].failure,
        Some(FailureKind::NotFound)
    );
    let get = store.get_record_by_id("t", 5, &[]).await.unwrap();
    assert!(!get.success);
}
