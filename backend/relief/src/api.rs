//! Axum REST API handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Redirect, Response,
    },
    Extension, Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::auth::{AuthService, RecaptchaChallenge, UserRecord};
use crate::dashboard::{AdminDashboard, DashboardData};
use crate::errors::{AuthError, ReliefError, Result};
use crate::forms::{
    BeneficiaryAttachments, BeneficiaryForm, DonorForm, FormState, LoginForm, SignupForm, Submitted,
};
use crate::guards::{self, HOME};
use crate::models::{
    ApplicationStatus, BeneficiaryApplication, Donor, DonorStatus, Statistics, BENEFICIARIES, DONORS,
};
use crate::storage::{normalize_path, UploadFile};
use crate::store::{Direction, QueryConstraint};
use crate::AppState;

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeResponse {
    pub user: Option<UserRecord>,
    pub is_admin: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: UserRecord,
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSignInRequest {
    pub id_token: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResetRequest {
    pub code: String,
    pub new_password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeRequest {
    pub phone: String,
    pub recaptcha_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeResponse {
    pub verification_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    pub verification_id: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct RecaptchaQuery {
    pub action: Option<String>,
}

#[derive(Serialize)]
pub struct FormView {
    pub values: Map<String, Value>,
    pub state: FormState,
}

/// A file carried inside a JSON body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    #[serde(default)]
    pub document_type: Option<String>,
    /// Base64 of the file contents.
    pub data: String,
}

#[derive(Deserialize)]
pub struct ApplicationSubmission {
    #[serde(default)]
    pub photos: Vec<Attachment>,
    #[serde(default)]
    pub documents: Vec<Attachment>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Deserialize)]
pub struct StatusRequest<S> {
    pub status: S,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PledgeRequest {
    pub donor_id: String,
    pub beneficiary_id: String,
    pub amount: u64,
}

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: String,
}

fn session_response(auth: &AuthService) -> Result<Json<SessionResponse>> {
    let session = auth
        .current_session()
        .ok_or(ReliefError::Auth(AuthError::TokenExpired))?;
    Ok(Json(SessionResponse {
        user: session.user,
        token: session.token.token,
        expires_at: session.token.expires_at,
    }))
}

fn decode(field: &str, attachment: Attachment) -> Result<(Option<String>, UploadFile)> {
    let bytes = STANDARD
        .decode(attachment.data.trim())
        .map_err(|_| ReliefError::field(field, format!("{} is not valid base64", attachment.name)))?;
    Ok((
        attachment.document_type,
        UploadFile {
            name: attachment.name,
            bytes,
        },
    ))
}

fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

// ─────────────────────────────────────────────────────────
// Public
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /`
///
/// The signed-in user, if the request carries a valid bearer token.
pub async fn home(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<HomeResponse>> {
    let auth = guards::session_from_headers(&state.auth, &headers).await?;
    let is_admin = auth.is_admin().await.unwrap_or(false);
    Ok(Json(HomeResponse {
        user: auth.current_user(),
        is_admin,
    }))
}

/// `GET /files/*path`
pub async fn get_file(State(state): State<Arc<AppState>>, Path(path): Path<String>) -> Result<Response> {
    let path = normalize_path(&path)?;
    let bytes = state
        .storage
        .blobs()
        .get(&path)
        .await?
        .ok_or_else(|| ReliefError::not_found("files", &path))?;
    Ok(([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response())
}

/// Any unknown route.
pub async fn fallback() -> Redirect {
    Redirect::to(HOME)
}

// ─────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────

/// `POST /auth/sign-up`
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Map<String, Value>>,
) -> Result<impl IntoResponse> {
    let auth = AuthService::new(state.auth.clone());
    let mut form = SignupForm::new();
    form.patch_values(&body);
    form.submit(&auth).await?;
    Ok((StatusCode::CREATED, session_response(&auth)?))
}

/// `POST /auth/sign-in`
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<SessionResponse>> {
    let auth = AuthService::new(state.auth.clone());
    let mut form = LoginForm::new();
    form.patch_values(&body);
    form.submit(&auth).await?;
    session_response(&auth)
}

/// `POST /auth/google`
pub async fn sign_in_with_google(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GoogleSignInRequest>,
) -> Result<Json<SessionResponse>> {
    let auth = AuthService::new(state.auth.clone());
    auth.sign_in_with_google(&body.id_token).await?;
    session_response(&auth)
}

/// `POST /auth/logout`
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<StatusCode> {
    let auth = guards::session_from_headers(&state.auth, &headers).await?;
    auth.logout().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /auth/reset-password`
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EmailRequest>,
) -> Result<StatusCode> {
    AuthService::new(state.auth.clone())
        .reset_password(&body.email)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// `POST /auth/reset-password/confirm`
pub async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConfirmResetRequest>,
) -> Result<StatusCode> {
    AuthService::new(state.auth.clone())
        .confirm_password_reset(&body.code, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /auth/recaptcha`
pub async fn recaptcha(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecaptchaQuery>,
) -> Json<RecaptchaChallenge> {
    let action = query.action.unwrap_or_else(|| "phone_sign_in".to_string());
    Json(AuthService::new(state.auth.clone()).setup_recaptcha(&action))
}

/// `POST /auth/phone/send-code`
pub async fn send_phone_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendCodeRequest>,
) -> Result<Json<SendCodeResponse>> {
    let verification_id = AuthService::new(state.auth.clone())
        .send_phone_verification_code(&body.phone, &body.recaptcha_token)
        .await?;
    Ok(Json(SendCodeResponse { verification_id }))
}

/// `POST /auth/phone/verify`
pub async fn verify_phone_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyCodeRequest>,
) -> Result<Json<SessionResponse>> {
    let auth = AuthService::new(state.auth.clone());
    auth.verify_phone_code(&body.verification_id, &body.code).await?;
    session_response(&auth)
}

/// `GET /auth/me`
pub async fn me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<SessionResponse>> {
    let auth = guards::session_from_headers(&state.auth, &headers).await?;
    session_response(&auth)
}

// ─────────────────────────────────────────────────────────
// Signed-in pages
// ─────────────────────────────────────────────────────────

/// `GET /apply-for-help`
pub async fn application_form(State(state): State<Arc<AppState>>) -> Json<FormView> {
    let form = BeneficiaryForm::new(
        state.persistence.clone(),
        state.storage.clone(),
        state.config.redirect_delay(),
    );
    Json(FormView {
        values: form.group().values().clone(),
        state: form.state().clone(),
    })
}

/// `POST /apply-for-help`
pub async fn submit_application(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Arc<AuthService>>,
    Json(body): Json<ApplicationSubmission>,
) -> Result<(StatusCode, Json<Submitted>)> {
    let mut attachments = BeneficiaryAttachments::default();
    for photo in body.photos {
        attachments.photos.push(decode("photos", photo)?.1);
    }
    for document in body.documents {
        let (document_type, file) = decode("documents", document)?;
        attachments
            .documents
            .push((document_type.unwrap_or_else(|| "other".to_string()), file));
    }

    let mut form = BeneficiaryForm::new(
        state.persistence.clone(),
        state.storage.clone(),
        state.config.redirect_delay(),
    );
    form.patch_values(&body.fields);
    let submitted = form.submit(attachments).await?;
    if let Some(user) = auth.current_user() {
        info!(uid = %user.uid, id = %submitted.id, "application filed");
    }
    Ok((StatusCode::CREATED, Json(submitted)))
}

/// `GET /offer-support`
pub async fn donor_form(State(state): State<Arc<AppState>>) -> Json<FormView> {
    let form = DonorForm::new(state.persistence.clone(), state.config.redirect_delay());
    Json(FormView {
        values: form.group().values().clone(),
        state: form.state().clone(),
    })
}

/// `POST /offer-support`
pub async fn submit_donor(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Submitted>)> {
    let mut form = DonorForm::new(state.persistence.clone(), state.config.redirect_delay());
    form.patch_values(&body);
    let submitted = form.submit().await?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

// ─────────────────────────────────────────────────────────
// Admin
// ─────────────────────────────────────────────────────────

/// `GET /admin`
pub async fn dashboard(State(state): State<Arc<AppState>>) -> Result<Json<DashboardData>> {
    let mut dashboard = AdminDashboard::new(state.persistence.clone());
    Ok(Json(dashboard.load().await?.clone()))
}

/// `GET /admin/applications/:id`
pub async fn get_application(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BeneficiaryApplication>> {
    let application = state
        .persistence
        .get_by_id::<BeneficiaryApplication>(BENEFICIARIES, &id)
        .await?
        .ok_or_else(|| ReliefError::not_found(BENEFICIARIES, &id))?;
    Ok(Json(application))
}

async fn apply_status(
    state: &AppState,
    id: &str,
    status: ApplicationStatus,
    notes: Option<&str>,
) -> Result<Json<BeneficiaryApplication>> {
    let mut dashboard = AdminDashboard::new(state.persistence.clone());
    dashboard.update_status(id, status, notes).await?;
    Ok(Json(dashboard.select(id)?.clone()))
}

/// `POST /admin/applications/:id/status`
pub async fn update_application_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest<ApplicationStatus>>,
) -> Result<Json<BeneficiaryApplication>> {
    apply_status(&state, &id, body.status, body.notes.as_deref()).await
}

/// `POST /admin/applications/:id/approve`
pub async fn approve_application(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<NotesRequest>>,
) -> Result<Json<BeneficiaryApplication>> {
    let notes = body.and_then(|Json(b)| b.notes);
    apply_status(&state, &id, ApplicationStatus::Approved, notes.as_deref()).await
}

/// `POST /admin/applications/:id/reject`
pub async fn reject_application(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<NotesRequest>>,
) -> Result<Json<BeneficiaryApplication>> {
    let notes = body.and_then(|Json(b)| b.notes);
    apply_status(&state, &id, ApplicationStatus::Rejected, notes.as_deref()).await
}

/// `POST /admin/donors/:id/status`
pub async fn update_donor_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest<DonorStatus>>,
) -> Result<Json<Donor>> {
    state.persistence.update_donor_status(&id, body.status).await?;
    let donor = state
        .persistence
        .get_by_id::<Donor>(DONORS, &id)
        .await?
        .ok_or_else(|| ReliefError::not_found(DONORS, &id))?;
    Ok(Json(donor))
}

/// `POST /admin/pledges`
pub async fn create_pledge(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PledgeRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>)> {
    let id = state
        .persistence
        .create_pledge(&body.donor_id, &body.beneficiary_id, body.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// `GET /admin/statistics`
pub async fn statistics(State(state): State<Arc<AppState>>) -> Result<Json<Statistics>> {
    Ok(Json(state.persistence.get_statistics().await?))
}

fn snapshot_event<T: Serialize>(name: &'static str, item: Result<Vec<T>>) -> Event {
    let event = match item {
        Ok(records) => Event::default().event(name).json_data(&records),
        Err(e) => return Event::default().event("error").data(e.to_string()),
    };
    event.unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// `GET /admin/events`
///
/// Server-sent events carrying a fresh snapshot of applications or donors
/// after every change. The listeners are released when the client goes away.
pub async fn events(State(state): State<Arc<AppState>>) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let newest_first = vec![QueryConstraint::order_by("createdAt", Direction::Desc)];
    let applications = state
        .persistence
        .on_collection_change::<BeneficiaryApplication>(BENEFICIARIES, newest_first.clone())
        .into_stream()
        .map(|item| snapshot_event(BENEFICIARIES, item));
    let donors = state
        .persistence
        .on_collection_change::<Donor>(DONORS, newest_first)
        .into_stream()
        .map(|item| snapshot_event(DONORS, item));

    debug!("admin event stream opened");
    let merged = stream::select(applications, donors).map(Ok::<_, Infallible>);
    Sse::new(merged).keep_alive(KeepAlive::default())
}
