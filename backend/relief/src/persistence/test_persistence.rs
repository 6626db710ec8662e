use std::time::Duration;

use serde_json::{json, Value};

use super::PersistenceService;
use crate::errors::ReliefError;
use crate::models::{
    ApplicationStatus, BeneficiaryApplication, Donor, DonorStatus, DonorType, Pledge, PledgeStatus,
    BENEFICIARIES, DONORS, PLEDGES,
};
use crate::store::{Direction, QueryConstraint};
use crate::test_fixtures::{memory_persistence, sample_application, sample_donor};

async fn next_within<T: Send + 'static>(sub: &mut crate::subscription::Subscription<T>) -> Option<crate::errors::Result<T>> {
    tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("subscription produced nothing in time")
}

#[tokio::test]
async fn test_create_then_get_by_id_returns_same_fields() {
    let svc = memory_persistence();
    let data = json!({ "name": "Relief Org", "budget": 1200, "tags": ["a", "b"] });

    let id = svc.create("donors", &data).await.unwrap();
    let back: Value = svc.get_by_id("donors", &id).await.unwrap().unwrap();

    assert_eq!(back["id"], id);
    assert_eq!(back["name"], "Relief Org");
    assert_eq!(back["budget"], 1200);
    assert_eq!(back["tags"], json!(["a", "b"]));
    assert!(back["createdAt"].is_string());
    assert_eq!(back["createdAt"], back["updatedAt"]);
}

#[tokio::test]
async fn test_get_all_on_empty_collection_is_empty() {
    let svc = memory_persistence();
    let all: Vec<Value> = svc.get_all(PLEDGES).await.unwrap();
    assert!(all.is_empty());
    let q: Vec<Value> = svc
        .query_documents(PLEDGES, &[QueryConstraint::where_eq("status", "pending")])
        .await
        .unwrap();
    assert!(q.is_empty());
}

#[tokio::test]
async fn test_update_merges_and_refreshes_timestamp() {
    let svc = memory_persistence();
    let id = svc.create("notes", &json!({ "a": 1, "b": 2 })).await.unwrap();
    let before: Value = svc.get_by_id("notes", &id).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    svc.update("notes", &id, &json!({ "b": 3, "id": "spoofed" })).await.unwrap();

    let after: Value = svc.get_by_id("notes", &id).await.unwrap().unwrap();
    assert_eq!(after["id"], id);
    assert_eq!(after["a"], 1);
    assert_eq!(after["b"], 3);
    assert_eq!(after["createdAt"], before["createdAt"]);
    assert_ne!(after["updatedAt"], before["updatedAt"]);
}

#[tokio::test]
async fn test_update_missing_record_is_not_found() {
    let svc = memory_persistence();
    let err = svc.update("notes", "ghost", &json!({ "a": 1 })).await.unwrap_err();
    assert!(matches!(err, ReliefError::NotFound { .. }));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let svc = memory_persistence();
    let id = svc.create("notes", &json!({ "a": 1 })).await.unwrap();
    svc.delete("notes", &id).await.unwrap();
    svc.delete("notes", &id).await.unwrap();
    assert!(svc.get_by_id::<Value>("notes", &id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_new_application_is_pending_with_zero_priority() {
    let svc = memory_persistence();
    let id = svc.create_beneficiary_application(&sample_application()).await.unwrap();

    let app: BeneficiaryApplication = svc.get_by_id(BENEFICIARIES, &id).await.unwrap().unwrap();
    assert_eq!(app.id, id);
    assert_eq!(app.status, ApplicationStatus::Pending);
    assert_eq!(app.priority_score, 0);
    assert!(app.photos.is_empty() && app.documents.is_empty());
    assert_eq!(app.details, sample_application());
    assert!(app.created_at.is_some());
}

#[tokio::test]
async fn test_status_update_checks_workflow_and_keeps_notes() {
    let svc = memory_persistence();
    let id = svc.create_beneficiary_application(&sample_application()).await.unwrap();

    svc.update_application_status(&id, ApplicationStatus::UnderVerification, Some("site visit booked"))
        .await
        .unwrap();
    let err = svc
        .update_application_status(&id, ApplicationStatus::Completed, None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Cannot move from Under Verification to Completed");

    let app: BeneficiaryApplication = svc.get_by_id(BENEFICIARIES, &id).await.unwrap().unwrap();
    assert_eq!(app.status, ApplicationStatus::UnderVerification);
    assert_eq!(app.admin_notes.as_deref(), Some("site visit booked"));

    let err = svc
        .update_application_status("ghost", ApplicationStatus::Approved, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReliefError::NotFound { .. }));
}

#[tokio::test]
async fn test_donor_and_pledge_helpers() {
    let svc = memory_persistence();
    let donor_id = svc
        .create_donor(&sample_donor(DonorType::Organisation, "Ayesha"))
        .await
        .unwrap();
    let donor: Donor = svc.get_by_id(DONORS, &donor_id).await.unwrap().unwrap();
    assert_eq!(donor.status, DonorStatus::Registered);
    assert_eq!((donor.total_pledges, donor.active_pledges), (0, 0));

    svc.update_donor_status(&donor_id, DonorStatus::Verified).await.unwrap();
    assert!(svc.update_donor_status(&donor_id, DonorStatus::Completed).await.is_err());

    // The beneficiary does not need to exist.
    let pledge_id = svc.create_pledge(&donor_id, "no-such-app", 50_000).await.unwrap();
    let pledge: Pledge = svc.get_by_id(PLEDGES, &pledge_id).await.unwrap().unwrap();
    assert_eq!(pledge.status, PledgeStatus::Pending);
    assert_eq!(pledge.beneficiary_id, "no-such-app");

    assert!(matches!(
        svc.create_pledge(&donor_id, "x", 0).await,
        Err(ReliefError::Validation(_))
    ));
}

#[tokio::test]
async fn test_statistics_count_by_linear_scan() {
    let svc = memory_persistence();
    let a = svc.create_beneficiary_application(&sample_application()).await.unwrap();
    let b = svc.create_beneficiary_application(&sample_application()).await.unwrap();
    svc.create_beneficiary_application(&sample_application()).await.unwrap();
    svc.update_application_status(&a, ApplicationStatus::Approved, None).await.unwrap();
    svc.update_application_status(&b, ApplicationStatus::UnderVerification, None).await.unwrap();
    let d = svc.create_donor(&sample_donor(DonorType::Individual, "")).await.unwrap();
    svc.create_pledge(&d, &a, 10).await.unwrap();

    let stats = svc.get_statistics().await.unwrap();
    assert_eq!(stats.total_beneficiaries, 3);
    assert_eq!(stats.total_donors, 1);
    assert_eq!(stats.total_pledges, 1);
    assert_eq!(stats.pending_applications, 1);
    assert_eq!(stats.approved_applications, 1);
}

#[tokio::test]
async fn test_query_documents_filters_and_orders() {
    let svc = memory_persistence();
    for score in [3, 1, 2] {
        svc.create("scores", &json!({ "score": score, "kind": "x" })).await.unwrap();
    }
    svc.create("scores", &json!({ "score": 9, "kind": "y" })).await.unwrap();

    let rows: Vec<Value> = svc
        .query_documents(
            "scores",
            &[
                QueryConstraint::where_eq("kind", "x"),
                QueryConstraint::order_by("score", Direction::Asc),
            ],
        )
        .await
        .unwrap();
    let scores: Vec<i64> = rows.iter().map(|r| r["score"].as_i64().unwrap()).collect();
    assert_eq!(scores, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_document_subscription_emits_on_change_and_delete() {
    let svc = memory_persistence();
    let id = svc.create("notes", &json!({ "v": 1 })).await.unwrap();

    let mut sub = svc.on_document_change::<Value>("notes", &id);
    let first = next_within(&mut sub).await.unwrap().unwrap().unwrap();
    assert_eq!(first["v"], 1);

    // Changes elsewhere are ignored.
    svc.create("notes", &json!({ "v": 100 })).await.unwrap();
    svc.update("notes", &id, &json!({ "v": 2 })).await.unwrap();
    let second = next_within(&mut sub).await.unwrap().unwrap().unwrap();
    assert_eq!(second["v"], 2);

    svc.delete("notes", &id).await.unwrap();
    let gone = next_within(&mut sub).await.unwrap().unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn test_collection_subscription_and_cancel() {
    let svc = memory_persistence();
    let mut sub = svc.on_collection_change::<Value>(
        PLEDGES,
        vec![QueryConstraint::where_eq("status", "pending")],
    );
    assert!(next_within(&mut sub).await.unwrap().unwrap().is_empty());

    svc.create_pledge("d", "b", 5).await.unwrap();
    let rows = next_within(&mut sub).await.unwrap().unwrap();
    assert_eq!(rows.len(), 1);

    sub.cancel();
    assert!(sub.is_cancelled());
    // Once the listener task sees the cancellation the channel closes.
    svc.create_pledge("d", "b", 6).await.unwrap();
    let mut remaining = 0;
    while let Some(item) = next_within(&mut sub).await {
        item.unwrap();
        remaining += 1;
    }
    assert!(remaining <= 1);
}

#[tokio::test]
async fn test_persistence_over_sqlite_store() {
    let pool = crate::db::init_pool("sqlite::memory:").await.unwrap();
    let svc = PersistenceService::new(std::sync::Arc::new(crate::store::SqliteDocumentStore::new(pool)));
    let id = svc.create_beneficiary_application(&sample_application()).await.unwrap();
    let app: BeneficiaryApplication = svc.get_by_id(BENEFICIARIES, &id).await.unwrap().unwrap();
    assert_eq!(app.details, sample_application());
    assert_eq!(app.status, ApplicationStatus::Pending);
}

#[tokio::test]
async fn test_concurrent_updates_on_file_database_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("relief.db").display());
    let pool = crate::db::init_pool(&url).await.unwrap();
    let svc = PersistenceService::new(std::sync::Arc::new(crate::store::SqliteDocumentStore::new(pool)));
    let id = svc.create("notes", &json!({ "title": "shared" })).await.unwrap();

    let writes = (0..20).map(|i| {
        let svc = &svc;
        let id = &id;
        async move { svc.update("notes", id, &json!({ (format!("f{i}")): i })).await }
    });
    for result in futures::future::join_all(writes).await {
        result.unwrap();
    }

    let doc: Value = svc.get_by_id("notes", &id).await.unwrap().unwrap();
    assert_eq!(doc["title"], "shared");
    for i in 0..20 {
        assert_eq!(doc[format!("f{i}")], i, "field f{i} lost");
    }
}
