//! ReBuild Homes relief coordination service.
//!
//! Beneficiaries apply for housing help, donors register support, and
//! administrators triage applications. The HTTP surface in [`build_router`]
//! sits on top of the persistence, storage and authentication services.

pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod demo;
pub mod errors;
pub mod forms;
pub mod guards;
pub mod models;
pub mod persistence;
pub mod set_admin;
pub mod storage;
pub mod store;
pub mod subscription;

#[cfg(test)]
pub mod test_fixtures;

#[cfg(test)]
mod test_api;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use auth::{
    AuthContext, DisabledGoogleVerifier, GoogleTokenVerifier, HttpGoogleVerifier, HttpRecaptchaVerifier, LogNotifier,
    RecaptchaVerifier, SkipRecaptcha, SqliteIdentityProvider,
};
use config::Config;
use errors::Result;
use persistence::PersistenceService;
use storage::{FsBlobStore, StorageService};
use store::SqliteDocumentStore;

/// Shared by every handler.
pub struct AppState {
    pub config: Config,
    pub persistence: PersistenceService,
    pub storage: StorageService,
    pub auth: AuthContext,
}

impl AppState {
    /// Wire the production services: SQLite documents and identities,
    /// attachments on disk, and Google/reCAPTCHA checks when configured.
    pub async fn from_config(config: Config, pool: SqlitePool, client: Client) -> Result<Self> {
        let persistence = PersistenceService::new(Arc::new(SqliteDocumentStore::new(pool.clone())));
        let storage = StorageService::new(
            Arc::new(FsBlobStore::new(config.storage_root.clone())),
            &config.public_base_url,
        );

        let google: Arc<dyn GoogleTokenVerifier> = match &config.google_client_id {
            Some(client_id) => Arc::new(HttpGoogleVerifier::new(client.clone(), client_id.clone())),
            None => {
                info!("GOOGLE_CLIENT_ID not set; Google sign-in disabled");
                Arc::new(DisabledGoogleVerifier)
            }
        };
        let recaptcha: Arc<dyn RecaptchaVerifier> = match &config.recaptcha_secret {
            Some(secret) => Arc::new(HttpRecaptchaVerifier::new(client, secret.clone())),
            None => {
                warn!("RECAPTCHA_SECRET not set; phone sign-in is unprotected");
                Arc::new(SkipRecaptcha)
            }
        };
        let auth = AuthContext {
            provider: Arc::new(SqliteIdentityProvider::new(
                pool,
                config.session_ttl(),
                config.phone_code_ttl(),
            )),
            google,
            recaptcha,
            notifier: Arc::new(LogNotifier),
            recaptcha_site_key: config.recaptcha_site_key.clone(),
        };

        if config.seed_demo_data {
            demo::seed_demo_data(&persistence).await?;
        }

        Ok(Self {
            config,
            persistence,
            storage,
            auth,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let signed_in = Router::new()
        .route(
            "/apply-for-help",
            get(api::application_form).post(api::submit_application),
        )
        .route("/offer-support", get(api::donor_form).post(api::submit_donor))
        .route_layer(middleware::from_fn_with_state(state.clone(), guards::require_user));

    let admin = Router::new()
        .route("/admin", get(api::dashboard))
        .route("/admin/applications/:id", get(api::get_application))
        .route(
            "/admin/applications/:id/status",
            post(api::update_application_status),
        )
        .route("/admin/applications/:id/approve", post(api::approve_application))
        .route("/admin/applications/:id/reject", post(api::reject_application))
        .route("/admin/donors/:id/status", post(api::update_donor_status))
        .route("/admin/pledges", post(api::create_pledge))
        .route("/admin/statistics", get(api::statistics))
        .route("/admin/events", get(api::events))
        .route_layer(middleware::from_fn_with_state(state.clone(), guards::require_admin));

    Router::new()
        .route("/", get(api::home))
        .route("/health", get(api::health))
        .route("/files/*path", get(api::get_file))
        .route("/auth/sign-up", post(api::sign_up))
        .route("/auth/sign-in", post(api::sign_in))
        .route("/auth/google", post(api::sign_in_with_google))
        .route("/auth/logout", post(api::logout))
        .route("/auth/reset-password", post(api::reset_password))
        .route("/auth/reset-password/confirm", post(api::confirm_password_reset))
        .route("/auth/recaptcha", get(api::recaptcha))
        .route("/auth/phone/send-code", post(api::send_phone_code))
        .route("/auth/phone/verify", post(api::verify_phone_code))
        .route("/auth/me", get(api::me))
        .merge(signed_in)
        .merge(admin)
        .fallback(api::fallback)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
