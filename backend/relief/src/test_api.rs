use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::auth::{AuthContext, Claims, SqliteIdentityProvider, ADMIN_CLAIM};
use crate::config::Config;
use crate::db::init_pool;
use crate::storage::{FsBlobStore, StorageService};
use crate::test_fixtures::memory_persistence;
use crate::{build_router, AppState};

struct Harness {
    app: Router,
    state: Arc<AppState>,
    _storage: TempDir,
}

async fn harness() -> Harness {
    let storage_dir = tempfile::tempdir().expect("tempdir");
    let config = Config::default();
    let pool = init_pool(&config.database_url).await.unwrap();
    let provider = SqliteIdentityProvider::new(pool, Duration::from_secs(600), Duration::from_secs(300));
    let state = Arc::new(AppState {
        storage: StorageService::new(
            Arc::new(FsBlobStore::new(storage_dir.path())),
            &config.public_base_url,
        ),
        persistence: memory_persistence(),
        auth: AuthContext::local(Arc::new(provider)),
        config,
    });
    Harness {
        app: build_router(state.clone()),
        state,
        _storage: storage_dir,
    }
}

impl Harness {
    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value, Option<String>) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let location = resp
            .headers()
            .get(header::LOCATION)
            .map(|l| l.to_str().unwrap().to_string());
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json, location)
    }

    async fn sign_up(&self, email: &str) -> (String, String) {
        let (status, body, _) = self
            .send(
                Method::POST,
                "/auth/sign-up",
                None,
                Some(json!({
                    "name": "Ana",
                    "email": email,
                    "password": "secret1",
                    "confirmPassword": "secret1",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["uid"].as_str().unwrap().to_string(),
        )
    }

    async fn make_admin(&self, uid: &str) {
        let mut claims = Claims::new();
        claims.insert(ADMIN_CLAIM.to_string(), json!(true));
        self.state.auth.provider.set_custom_claims(uid, &claims).await.unwrap();
    }
}

fn application() -> Value {
    json!({
        "fullName": "Sunil Fernando",
        "nic": "199012345678",
        "phone": "0779876543",
        "addressBefore": "12, River Rd, Kalutara",
        "currentAddress": "Temple hall, Kalutara",
        "disasterType": "Landslide",
        "disasterDate": "2024-06-02",
        "district": "Kalutara",
        "gnDivision": "Div-12",
        "description": "Rear wall collapsed.",
        "damageLevel": "Partially Damaged",
        "familyMembers": 3,
        "familyComposition": "3 adults",
        "monthlyIncome": "< LKR 30,000",
        "hasLandDeed": false,
        "consentData": true,
        "consentTruth": true,
        "photos": [{ "name": "wall.jpg", "data": STANDARD.encode(b"jpeg bytes") }],
    })
}

#[tokio::test]
async fn test_health_and_unknown_route() {
    let h = harness().await;
    let (status, body, _) = h.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, location) = h.send(Method::GET, "/no/such/page", None, None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/"));
}

#[tokio::test]
async fn test_signed_out_visitor_is_sent_home_with_return_url() {
    let h = harness().await;
    let (status, _, location) = h.send(Method::GET, "/apply-for-help", None, None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/?returnUrl=%2Fapply-for-help"));

    let (status, _, location) = h.send(Method::GET, "/offer-support", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/?returnUrl=%2Foffer-support"));
}

#[tokio::test]
async fn test_invalid_sign_up_reports_fields() {
    let h = harness().await;
    let (status, body, _) = h
        .send(
            Method::POST,
            "/auth/sign-up",
            None,
            Some(json!({ "email": "nope", "password": "123" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["email"].is_array());
    assert!(body["fields"]["name"].is_array());
}

#[tokio::test]
async fn test_apply_and_fetch_attachment() {
    let h = harness().await;
    let (token, _) = h.sign_up("ana@example.com").await;

    let (status, body, _) = h.send(Method::GET, "/apply-for-help", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["values"]["disasterType"], "Flood");

    let (status, body, _) = h
        .send(Method::POST, "/apply-for-help", Some(&token), Some(application()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["redirectTo"], "/");
    let id = body["id"].as_str().unwrap().to_string();

    let stored: Value = h
        .state
        .persistence
        .get_by_id(crate::models::BENEFICIARIES, &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["status"], "pending");
    assert_eq!(stored["priorityScore"], 0);
    let photo_url = stored["photos"][0].as_str().unwrap();
    let path = photo_url.split("/files/").nth(1).unwrap();

    let req = Request::builder()
        .uri(format!("/files/{path}"))
        .body(Body::empty())
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"jpeg bytes");
}

#[tokio::test]
async fn test_admin_routes_need_admin_claim() {
    let h = harness().await;
    let (token, uid) = h.sign_up("ana@example.com").await;

    let (status, _, location) = h.send(Method::GET, "/admin", Some(&token), None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/"));

    h.make_admin(&uid).await;
    let (status, body, _) = h.send(Method::GET, "/admin", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statistics"]["totalBeneficiaries"], 0);

    let (_, home, _) = h.send(Method::GET, "/", Some(&token), None).await;
    assert_eq!(home["isAdmin"], true);
}

#[tokio::test]
async fn test_admin_approves_application() {
    let h = harness().await;
    let (token, uid) = h.sign_up("ana@example.com").await;
    h.make_admin(&uid).await;

    let (_, body, _) = h
        .send(Method::POST, "/apply-for-help", Some(&token), Some(application()))
        .await;
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body, _) = h
        .send(Method::GET, &format!("/admin/applications/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fullName"], "Sunil Fernando");
    assert_eq!(body["status"], "pending");

    let (status, _, _) = h
        .send(Method::GET, "/admin/applications/APP-404", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body, _) = h
        .send(
            Method::POST,
            &format!("/admin/applications/{id}/approve"),
            Some(&token),
            Some(json!({ "notes": "Verified on site" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "approved");
    assert_eq!(body["adminNotes"], "Verified on site");

    let (status, _, _) = h
        .send(
            Method::POST,
            &format!("/admin/applications/{id}/status"),
            Some(&token),
            Some(json!({ "status": "pending" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body, _) = h
        .send(
            Method::POST,
            "/admin/pledges",
            Some(&token),
            Some(json!({ "donorId": "DON-001", "beneficiaryId": id, "amount": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["amount"].is_array());

    let (_, stats, _) = h.send(Method::GET, "/admin/statistics", Some(&token), None).await;
    assert_eq!(stats["approvedApplications"], 1);
}
