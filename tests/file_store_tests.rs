//! Integration tests for the JSON-file document store
//!
//! Each test works in its own temporary directory and goes through the
//! `DocumentStore` trait, plus one end-to-end amendment run via the service.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use contractflow::store::{DocumentStore, FileStore, StoreError, CONTRACTS};
use contractflow::workflows::{AmendmentStage, ApprovalRecord, ApproverCategory, ContractStatus};
use contractflow::{Actor, ContractService, Decision};

fn temp_store() -> (TempDir, FileStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("data"));
    (dir, store)
}

#[tokio::test]
async fn test_insert_get_update_round_trip() {
    let (_dir, store) = temp_store();
    store
        .insert("contracts", "c-1", json!({ "id": "c-1", "status": "draft", "note": "x" }))
        .await
        .unwrap();

    store
        .update("contracts", "c-1", json!({ "status": "legal_review", "note": null }))
        .await
        .unwrap();

    let doc = store.get("contracts", "c-1").await.unwrap().unwrap();
    assert_eq!(doc["status"], "legal_review");
    assert!(doc.get("note").is_none());
    assert_eq!(doc["id"], "c-1");
}

#[tokio::test]
async fn test_missing_documents() {
    let (_dir, store) = temp_store();
    assert!(store.get("contracts", "nope").await.unwrap().is_none());

    let err = store
        .update("contracts", "nope", json!({ "status": "draft" }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    let found = store
        .query("contracts", "status", &json!("draft"))
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_duplicate_insert_is_rejected() {
    let (_dir, store) = temp_store();
    store.insert("invites", "i-1", json!({ "id": "i-1" })).await.unwrap();
    let err = store
        .insert("invites", "i-1", json!({ "id": "i-1" }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
}

#[tokio::test]
async fn test_path_like_ids_are_invalid() {
    let (_dir, store) = temp_store();
    for id in ["../escape", "a/b", ""] {
        let err = store.get("contracts", id).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(_)), "{id}");
    }
    let err = store.insert("contracts", "c-1", json!([1, 2])).await.unwrap_err();
    assert!(matches!(err, StoreError::NotAnObject));
}

#[tokio::test]
async fn test_query_filters_and_orders_by_id() {
    let (dir, store) = temp_store();
    for (id, owner) in [("b", "u1"), ("a", "u1"), ("c", "u2")] {
        store
            .insert("notifications", id, json!({ "id": id, "userId": owner }))
            .await
            .unwrap();
    }
    // Leftover temp files from an interrupted write are ignored
    std::fs::write(
        dir.path().join("data/notifications/z.json.tmp"),
        b"{\"userId\":\"u1\"}",
    )
    .unwrap();

    let docs = store
        .query("notifications", "userId", &json!("u1"))
        .await
        .unwrap();
    let ids: Vec<&str> = docs.iter().filter_map(|d| d["id"].as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_concurrent_updates_do_not_corrupt_documents() {
    let (_dir, store) = temp_store();
    let store = Arc::new(store);
    store.insert("contracts", "c-1", json!({ "id": "c-1" })).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .update("contracts", "c-1", json!({ format!("field{i}"): i }))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let doc = store.get("contracts", "c-1").await.unwrap().unwrap();
    let fields = doc.as_object().unwrap();
    assert_eq!(fields.len(), 17);
    assert_eq!(fields["field7"], Value::from(7));
}

#[tokio::test]
async fn test_amendment_lifecycle_persists_through_file_store() {
    let (_dir, store) = temp_store();
    let service = ContractService::new(Arc::new(store.clone()));
    let actor = Actor::new("u-1", "owner@example.com");

    let contract = service
        .create_contract(&actor, "Grazing lease", Default::default())
        .await
        .unwrap();
    service
        .request_transition(&actor, &contract.id, ContractStatus::Implementation.into(), None)
        .await
        .unwrap();
    assert!(service
        .request_transition_str(&actor, &contract.id, "amendment", None)
        .await
        .unwrap()
        .is_accepted());

    // Both sign-offs move the stage forward one step at a time
    for category in [ApproverCategory::Legal, ApproverCategory::Management] {
        service
            .set_approvers(
                &actor,
                &contract.id,
                category,
                vec![ApprovalRecord::pending(format!("{category}@example.com"))],
            )
            .await
            .unwrap();
    }
    service
        .record_decision(
            &actor,
            &contract.id,
            ApproverCategory::Legal,
            "legal@example.com",
            Decision::Approve,
            None,
        )
        .await
        .unwrap();
    let after = service
        .record_decision(
            &actor,
            &contract.id,
            ApproverCategory::Management,
            "management@example.com",
            Decision::Approve,
            None,
        )
        .await
        .unwrap();
    assert_eq!(after.amendment_stage, Some(AmendmentStage::Legal));

    for stage in ["wwf", "counterparty"] {
        assert!(service
            .request_transition_str(&actor, &contract.id, stage, None)
            .await
            .unwrap()
            .is_accepted());
    }
    assert!(service
        .request_transition_str(&actor, &contract.id, "implementation", None)
        .await
        .unwrap()
        .is_accepted());

    let raw = store.get(CONTRACTS, &contract.id).await.unwrap().unwrap();
    assert_eq!(raw["status"], "implementation");
    assert_eq!(raw["isAmended"], false);
    assert!(raw.get("amendmentStage").is_none());
    assert!(raw.get("originalStatus").is_none());
    let actions: Vec<&str> = raw["timeline"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["action"].as_str())
        .collect();
    assert!(actions.contains(&"Amendment Completed"));
}
