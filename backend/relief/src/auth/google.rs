//! Google sign-in. ID tokens are checked against Google's `tokeninfo`
//! endpoint and must have been issued for our OAuth client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::{AuthError, Result};

use super::identity::FederatedIdentity;

pub const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[async_trait]
pub trait GoogleTokenVerifier: Send + Sync + 'static {
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity>;
}

/// Used when no Google client id is configured.
pub struct DisabledGoogleVerifier;

#[async_trait]
impl GoogleTokenVerifier for DisabledGoogleVerifier {
    async fn verify(&self, _id_token: &str) -> Result<FederatedIdentity> {
        Err(AuthError::ProviderDisabled.into())
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    // Google returns booleans in this payload as strings.
    email_verified: Option<String>,
    name: Option<String>,
}

pub struct HttpGoogleVerifier {
    client: Client,
    client_id: String,
}

impl HttpGoogleVerifier {
    pub fn new(client: Client, client_id: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl GoogleTokenVerifier for HttpGoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity> {
        let resp = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(AuthError::from)?;

        if resp.status().is_client_error() {
            warn!("Google rejected an ID token ({})", resp.status());
            return Err(AuthError::InvalidCredentials.into());
        }
        if !resp.status().is_success() {
            return Err(AuthError::Network(format!("tokeninfo returned {}", resp.status())).into());
        }

        let info: TokenInfo = resp.json().await.map_err(AuthError::from)?;
        debug!(aud = %info.aud, "tokeninfo response");
        identity_from(info, &self.client_id)
    }
}

fn identity_from(info: TokenInfo, client_id: &str) -> Result<FederatedIdentity> {
    if info.aud != client_id {
        warn!("ID token issued for another client: {}", info.aud);
        return Err(AuthError::InvalidCredentials.into());
    }
    if info.email.is_none() || info.email_verified.as_deref() != Some("true") {
        return Err(AuthError::InvalidCredentials.into());
    }
    Ok(FederatedIdentity {
        email: info.email,
        phone: None,
        display_name: info.name,
    })
}
