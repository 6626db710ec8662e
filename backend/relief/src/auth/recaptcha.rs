//! reCAPTCHA checks guarding the phone sign-in flow.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{AuthError, Result};

pub const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// What a client needs to render the challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecaptchaChallenge {
    pub site_key: Option<String>,
    pub size: String,
    pub action: String,
}

#[async_trait]
pub trait RecaptchaVerifier: Send + Sync + 'static {
    /// `false` when the token was rejected.
    async fn verify(&self, token: &str) -> Result<bool>;
}

/// Accepts every token. Selected when no secret is configured.
pub struct SkipRecaptcha;

#[async_trait]
impl RecaptchaVerifier for SkipRecaptcha {
    async fn verify(&self, _token: &str) -> Result<bool> {
        warn!("reCAPTCHA secret not configured; skipping check");
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

pub struct HttpRecaptchaVerifier {
    client: Client,
    secret: String,
}

impl HttpRecaptchaVerifier {
    pub fn new(client: Client, secret: impl Into<String>) -> Self {
        Self {
            client,
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl RecaptchaVerifier for HttpRecaptchaVerifier {
    async fn verify(&self, token: &str) -> Result<bool> {
        if token.trim().is_empty() {
            return Ok(false);
        }
        let body: SiteVerifyResponse = self
            .client
            .post(SITEVERIFY_URL)
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await
            .map_err(AuthError::from)?
            .json()
            .await
            .map_err(AuthError::from)?;
        if !body.success {
            warn!("reCAPTCHA rejected: {:?}", body.error_codes);
        }
        Ok(body.success)
    }
}
