//! Authentication: a session-scoped client over the identity provider.
//!
//! An [`AuthService`] represents one signed-in (or signed-out) client. The
//! HTTP layer resumes one per request from the bearer token.

pub mod google;
pub mod identity;
pub mod notifier;
pub mod password;
pub mod recaptcha;
mod sqlite;

#[cfg(test)]
mod test_auth;

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio::sync::watch;
use tracing::{info, warn};

pub use google::{DisabledGoogleVerifier, GoogleTokenVerifier, HttpGoogleVerifier};
pub use identity::{
    has_claim, Claims, FederatedIdentity, IdTokenResult, IdentityProvider, SignInProvider, UserRecord,
    ADMIN_CLAIM, VERIFIER_CLAIM,
};
pub use notifier::{LogNotifier, Notifier, OutboundMessage};
pub use recaptcha::{HttpRecaptchaVerifier, RecaptchaChallenge, RecaptchaVerifier, SkipRecaptcha};
pub use sqlite::SqliteIdentityProvider;

use crate::errors::{AuthError, ReliefError, Result};

/// Everything an [`AuthService`] talks to. Cheap to clone.
#[derive(Clone)]
pub struct AuthContext {
    pub provider: Arc<dyn IdentityProvider>,
    pub google: Arc<dyn GoogleTokenVerifier>,
    pub recaptcha: Arc<dyn RecaptchaVerifier>,
    pub notifier: Arc<dyn Notifier>,
    pub recaptcha_site_key: Option<String>,
}

impl AuthContext {
    /// A context with Google sign-in disabled, reCAPTCHA skipped and codes logged.
    pub fn local(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            google: Arc::new(DisabledGoogleVerifier),
            recaptcha: Arc::new(SkipRecaptcha),
            notifier: Arc::new(LogNotifier),
            recaptcha_site_key: None,
        }
    }
}

/// The signed-in user and the token backing the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: UserRecord,
    pub token: IdTokenResult,
}

pub struct AuthService {
    ctx: AuthContext,
    session: watch::Sender<Option<Session>>,
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"))
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9]{9,15}$").expect("static regex"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

fn check_credentials(email: &str, password: &str) -> Result<()> {
    if !is_valid_email(email) {
        return Err(AuthError::InvalidEmail.into());
    }
    if password.chars().count() < password::MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword.into());
    }
    Ok(())
}

impl AuthService {
    /// A signed-out client.
    pub fn new(ctx: AuthContext) -> Self {
        let (session, _) = watch::channel(None);
        Self { ctx, session }
    }

    /// Restore a client from a bearer token. Unknown or expired tokens give a
    /// signed-out client rather than an error.
    pub async fn resume(ctx: AuthContext, token: Option<&str>) -> Result<Self> {
        let service = Self::new(ctx);
        let Some(token) = token else {
            return Ok(service);
        };
        match service.ctx.provider.verify_session(token).await {
            Ok((user, token)) => {
                service.session.send_replace(Some(Session { user, token }));
            }
            Err(ReliefError::Auth(AuthError::TokenExpired)) => {}
            Err(e) => return Err(e),
        }
        Ok(service)
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        self.session.borrow().as_ref().map(|s| s.user.clone())
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    /// The current-user stream. The receiver sees the present value first.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    pub async fn sign_up(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<UserRecord> {
        check_credentials(email, password)?;
        let display_name = display_name.map(str::trim).filter(|n| !n.is_empty());
        let user = self.ctx.provider.create_user(email.trim(), password, display_name).await?;
        self.start_session(user).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserRecord> {
        if !is_valid_email(email) {
            return Err(AuthError::InvalidEmail.into());
        }
        let user = self.ctx.provider.verify_password(email.trim(), password).await?;
        self.start_session(user).await
    }

    pub async fn sign_in_with_google(&self, id_token: &str) -> Result<UserRecord> {
        let identity = self.ctx.google.verify(id_token).await?;
        let user = self
            .ctx
            .provider
            .upsert_federated_user(SignInProvider::Google, &identity)
            .await?;
        self.start_session(user).await
    }

    /// Revoke the session, if any. Signing out twice is fine.
    pub async fn logout(&self) -> Result<()> {
        let previous = self.session.send_replace(None);
        if let Some(session) = previous {
            self.ctx.provider.revoke_session(&session.token.token).await?;
            info!(uid = %session.user.uid, "signed out");
        }
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> Result<()> {
        if !is_valid_email(email) {
            return Err(AuthError::InvalidEmail.into());
        }
        let email = email.trim().to_string();
        let code = self.ctx.provider.create_password_reset(&email).await?;
        self.ctx
            .notifier
            .send(OutboundMessage::PasswordReset { email, code })
            .await
    }

    pub async fn confirm_password_reset(&self, code: &str, new_password: &str) -> Result<()> {
        if new_password.chars().count() < password::MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword.into());
        }
        self.ctx.provider.confirm_password_reset(code.trim(), new_password).await
    }

    pub fn setup_recaptcha(&self, action: &str) -> RecaptchaChallenge {
        RecaptchaChallenge {
            site_key: self.ctx.recaptcha_site_key.clone(),
            size: "invisible".to_string(),
            action: action.to_string(),
        }
    }

    /// Returns the verification id to pass to [`verify_phone_code`](Self::verify_phone_code).
    pub async fn send_phone_verification_code(&self, phone: &str, recaptcha_token: &str) -> Result<String> {
        let phone = phone.trim();
        if !phone_regex().is_match(phone) {
            return Err(ReliefError::field("phone", "Enter a valid phone number"));
        }
        if !self.ctx.recaptcha.verify(recaptcha_token).await? {
            warn!(%phone, "phone sign-in blocked by reCAPTCHA");
            return Err(AuthError::RecaptchaFailed.into());
        }
        let (verification_id, code) = self.ctx.provider.create_phone_verification(phone).await?;
        self.ctx
            .notifier
            .send(OutboundMessage::PhoneCode {
                phone: phone.to_string(),
                code,
            })
            .await?;
        Ok(verification_id)
    }

    pub async fn verify_phone_code(&self, verification_id: &str, code: &str) -> Result<UserRecord> {
        let phone = self
            .ctx
            .provider
            .consume_phone_verification(verification_id, code.trim())
            .await?;
        let identity = FederatedIdentity {
            phone: Some(phone),
            ..Default::default()
        };
        let user = self
            .ctx
            .provider
            .upsert_federated_user(SignInProvider::Phone, &identity)
            .await?;
        self.start_session(user).await
    }

    /// The token result, re-reading claims from the provider when `force_refresh`.
    pub async fn get_id_token_result(&self, force_refresh: bool) -> Result<Option<IdTokenResult>> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !force_refresh {
            return Ok(Some(session.token));
        }
        let (user, token) = self
            .ctx
            .provider
            .verify_session(&session.token.token)
            .await
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;
        self.session.send_replace(Some(Session {
            user,
            token: token.clone(),
        }));
        Ok(Some(token))
    }

    /// Forces a token refresh so a freshly granted claim is seen immediately.
    pub async fn is_admin(&self) -> Result<bool> {
        Ok(self
            .get_id_token_result(true)
            .await?
            .map(|t| has_claim(&t.claims, ADMIN_CLAIM))
            .unwrap_or(false))
    }

    pub async fn is_verifier(&self) -> Result<bool> {
        Ok(self
            .get_id_token_result(false)
            .await?
            .map(|t| has_claim(&t.claims, VERIFIER_CLAIM))
            .unwrap_or(false))
    }

    async fn start_session(&self, user: UserRecord) -> Result<UserRecord> {
        let token = self.ctx.provider.issue_session(&user.uid).await?;
        self.session.send_replace(Some(Session {
            user: user.clone(),
            token,
        }));
        Ok(user)
    }
}
