//! The identity provider seam: accounts, sessions, custom claims and one-time codes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Result;

/// Custom claims attached to an account, e.g. `{ "admin": true }`.
pub type Claims = Map<String, Value>;

pub const ADMIN_CLAIM: &str = "admin";
pub const VERIFIER_CLAIM: &str = "verifier";

/// True only when the claim is present and exactly `true`.
pub fn has_claim(claims: &Claims, name: &str) -> bool {
    claims.get(name).and_then(Value::as_bool).unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignInProvider {
    Password,
    Google,
    Phone,
}

impl SignInProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Google => "google",
            Self::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "password" => Some(Self::Password),
            "google" => Some(Self::Google),
            "phone" => Some(Self::Phone),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uid: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub provider: SignInProvider,
    pub claims: Claims,
}

/// A bearer token together with the claims it currently carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTokenResult {
    pub token: String,
    pub claims: Claims,
    pub expires_at: DateTime<Utc>,
}

/// Identity facts the federated sign-in flows hand over.
#[derive(Debug, Clone, Default)]
pub struct FederatedIdentity {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Fails with `EmailAlreadyInUse` when the email is taken.
    async fn create_user(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<UserRecord>;

    /// Fails with `InvalidCredentials` for an unknown email or wrong password.
    async fn verify_password(&self, email: &str, password: &str) -> Result<UserRecord>;

    async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Find the account matching the identity's email (or phone), creating it
    /// on first sign-in.
    async fn upsert_federated_user(&self, provider: SignInProvider, identity: &FederatedIdentity) -> Result<UserRecord>;

    /// Replace the account's custom claims.
    async fn set_custom_claims(&self, uid: &str, claims: &Claims) -> Result<()>;

    async fn issue_session(&self, uid: &str) -> Result<IdTokenResult>;

    /// Resolve a bearer token to its account, reading the claims afresh.
    /// Fails with `TokenExpired` for unknown, revoked or expired tokens.
    async fn verify_session(&self, token: &str) -> Result<(UserRecord, IdTokenResult)>;

    async fn revoke_session(&self, token: &str) -> Result<()>;

    /// Returns the one-time reset code. Fails with `UserNotFound`.
    async fn create_password_reset(&self, email: &str) -> Result<String>;

    async fn confirm_password_reset(&self, code: &str, new_password: &str) -> Result<()>;

    /// Returns `(verification_id, code)`.
    async fn create_phone_verification(&self, phone: &str) -> Result<(String, String)>;

    /// Check a code, consuming it on success. Returns the verified phone number.
    async fn consume_phone_verification(&self, verification_id: &str, code: &str) -> Result<String>;
}
