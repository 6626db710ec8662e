//! Route guards for the authenticated and admin-only pages.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use reqwest::Url;
use tracing::{debug, warn};

use crate::auth::{AuthContext, AuthService};
use crate::errors::Result;
use crate::AppState;

pub const HOME: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

/// Home, remembering where the visitor was headed.
pub fn home_with_return_url(target: &str) -> String {
    match Url::parse_with_params("http://relief.invalid/", &[("returnUrl", target)]) {
        Ok(url) => format!("{HOME}?{}", url.query().unwrap_or_default()),
        Err(_) => HOME.to_string(),
    }
}

pub fn auth_guard(auth: &AuthService, target: &str) -> GuardDecision {
    if auth.current_user().is_some() {
        GuardDecision::Allow
    } else {
        GuardDecision::Redirect(home_with_return_url(target))
    }
}

pub async fn admin_guard(auth: &AuthService) -> GuardDecision {
    if auth.current_user().is_none() {
        return GuardDecision::Redirect(HOME.to_string());
    }
    match auth.is_admin().await {
        Ok(true) => GuardDecision::Allow,
        Ok(false) => GuardDecision::Redirect(HOME.to_string()),
        Err(e) => {
            warn!("admin check failed: {e}");
            GuardDecision::Redirect(HOME.to_string())
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn session_from_headers(ctx: &AuthContext, headers: &HeaderMap) -> Result<AuthService> {
    AuthService::resume(ctx.clone(), bearer_token(headers)).await
}

/// Middleware for pages that need a signed-in user. The resumed
/// [`AuthService`] is handed to the handler as a request extension.
pub async fn require_user(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let auth = match session_from_headers(&state.auth, req.headers()).await {
        Ok(auth) => auth,
        Err(e) => return e.into_response(),
    };
    let target = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| HOME.to_string());

    match auth_guard(&auth, &target) {
        GuardDecision::Allow => {
            req.extensions_mut().insert(Arc::new(auth));
            next.run(req).await
        }
        GuardDecision::Redirect(to) => {
            debug!(%target, "signed-out visitor redirected");
            Redirect::to(&to).into_response()
        }
    }
}

pub async fn require_admin(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let auth = match session_from_headers(&state.auth, req.headers()).await {
        Ok(auth) => auth,
        Err(e) => return e.into_response(),
    };
    match admin_guard(&auth).await {
        GuardDecision::Allow => {
            req.extensions_mut().insert(Arc::new(auth));
            next.run(req).await
        }
        GuardDecision::Redirect(to) => {
            warn!(path = %req.uri().path(), "non-admin denied");
            Redirect::to(&to).into_response()
        }
    }
}
