use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::{ChangeKind, DocumentStore, MemoryDocumentStore, QueryConstraint, SqliteDocumentStore};
use crate::db;

fn body(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

async fn backends() -> Vec<Arc<dyn DocumentStore>> {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    vec![
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(SqliteDocumentStore::new(pool)),
    ]
}

#[tokio::test]
async fn test_put_get_list_roundtrip() {
    for (n, store) in backends().await.into_iter().enumerate() {
        store.put("donors", "d1", body(json!({ "name": "A" }))).await.unwrap();
        store.put("donors", "d2", body(json!({ "name": "B" }))).await.unwrap();

        let d1 = store.get("donors", "d1").await.unwrap().unwrap();
        assert_eq!(d1.data["name"], "A", "backend #{n}");

        let all = store.list("donors").await.unwrap();
        let ids: Vec<_> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"], "backend #{n}");
    }
}

#[tokio::test]
async fn test_empty_collection_lists_nothing() {
    for store in backends().await {
        assert!(store.list("pledges").await.unwrap().is_empty());
        assert!(store
            .query("pledges", &[QueryConstraint::where_eq("status", "pending")])
            .await
            .unwrap()
            .is_empty());
        assert!(store.get("pledges", "missing").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_patch_merges_top_level_fields() {
    for (n, store) in backends().await.into_iter().enumerate() {
        store
            .put("beneficiaries", "b1", body(json!({ "status": "pending", "priorityScore": 0 })))
            .await
            .unwrap();
        let found = store
            .patch("beneficiaries", "b1", body(json!({ "status": "approved" })))
            .await
            .unwrap();
        assert!(found);

        let doc = store.get("beneficiaries", "b1").await.unwrap().unwrap();
        assert_eq!(doc.data["status"], "approved");
        assert_eq!(doc.data["priorityScore"], 0);

        let missing = store
            .patch("beneficiaries", "nope", body(json!({ "status": "approved" })))
            .await
            .unwrap();
        assert!(!missing, "backend #{n}");
    }
}

#[tokio::test]
async fn test_delete_reports_presence() {
    for store in backends().await {
        store.put("pledges", "p1", body(json!({ "amount": 10 }))).await.unwrap();
        assert!(store.delete("pledges", "p1").await.unwrap());
        assert!(!store.delete("pledges", "p1").await.unwrap());
        assert!(store.get("pledges", "p1").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_writes_publish_change_events() {
    for store in backends().await {
        let mut feed = store.watch();
        store.put("donors", "d1", body(json!({ "name": "A" }))).await.unwrap();
        store.patch("donors", "d1", body(json!({ "name": "B" }))).await.unwrap();
        store.delete("donors", "d1").await.unwrap();

        let kinds: Vec<ChangeKind> = vec![
            feed.recv().await.unwrap().kind,
            feed.recv().await.unwrap().kind,
            feed.recv().await.unwrap().kind,
        ];
        assert_eq!(kinds, vec![ChangeKind::Put, ChangeKind::Patch, ChangeKind::Delete]);
    }
}
