use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::*;
use crate::db::init_pool;
use crate::errors::{AuthError, ReliefError, Result};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingNotifier {
    fn last_code(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|m| match m {
            OutboundMessage::PasswordReset { code, .. } | OutboundMessage::PhoneCode { code, .. } => code.clone(),
        })
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

struct RejectRecaptcha;

#[async_trait]
impl RecaptchaVerifier for RejectRecaptcha {
    async fn verify(&self, _token: &str) -> Result<bool> {
        Ok(false)
    }
}

struct FixedGoogle;

#[async_trait]
impl GoogleTokenVerifier for FixedGoogle {
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity> {
        if id_token != "good-token" {
            return Err(AuthError::InvalidCredentials.into());
        }
        Ok(FederatedIdentity {
            email: Some("gina@example.com".to_string()),
            phone: None,
            display_name: Some("Gina".to_string()),
        })
    }
}

async fn setup() -> (AuthContext, Arc<RecordingNotifier>) {
    let pool = init_pool("sqlite::memory:").await.unwrap();
    let provider = SqliteIdentityProvider::new(pool, Duration::from_secs(600), Duration::from_secs(300));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut ctx = AuthContext::local(Arc::new(provider));
    ctx.notifier = notifier.clone();
    ctx.google = Arc::new(FixedGoogle);
    ctx.recaptcha_site_key = Some("site-key".to_string());
    (ctx, notifier)
}

fn auth_err(err: ReliefError) -> AuthError {
    match err {
        ReliefError::Auth(e) => e,
        other => panic!("expected an auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sign_up_signs_the_user_in() {
    let (ctx, _) = setup().await;
    let auth = AuthService::new(ctx);
    let mut users = auth.subscribe();
    assert!(users.borrow_and_update().is_none());

    let user = auth.sign_up("ana@example.com", "secret1", Some("Ana")).await.unwrap();
    assert_eq!(user.display_name.as_deref(), Some("Ana"));
    assert_eq!(user.provider, SignInProvider::Password);

    assert!(users.has_changed().unwrap());
    let seen = users.borrow_and_update().clone().unwrap();
    assert_eq!(seen.user.uid, user.uid);
    assert_eq!(auth.current_user().unwrap().uid, user.uid);
}

#[tokio::test]
async fn test_sign_up_validates_before_calling_provider() {
    let (ctx, _) = setup().await;
    let auth = AuthService::new(ctx.clone());

    let err = auth.sign_up("not-an-email", "secret1", None).await.unwrap_err();
    assert_eq!(auth_err(err), AuthError::InvalidEmail);

    let err = auth.sign_up("ana@example.com", "12345", None).await.unwrap_err();
    assert_eq!(auth_err(err), AuthError::WeakPassword);

    assert!(ctx.provider.get_user_by_email("ana@example.com").await.unwrap().is_none());
    assert!(auth.current_user().is_none());
}

#[tokio::test]
async fn test_duplicate_account_and_bad_password() {
    let (ctx, _) = setup().await;
    let auth = AuthService::new(ctx.clone());
    auth.sign_up("ana@example.com", "secret1", None).await.unwrap();

    let other = AuthService::new(ctx);
    let err = other.sign_up("ana@example.com", "secret2", None).await.unwrap_err();
    assert_eq!(auth_err(err), AuthError::EmailAlreadyInUse);

    let err = other.sign_in("ana@example.com", "wrong-password").await.unwrap_err();
    assert_eq!(auth_err(err), AuthError::InvalidCredentials);
    assert!(other.current_user().is_none());

    let user = other.sign_in("ana@example.com", "secret1").await.unwrap();
    assert_eq!(user.email.as_deref(), Some("ana@example.com"));
}

#[tokio::test]
async fn test_logout_revokes_the_token() {
    let (ctx, _) = setup().await;
    let auth = AuthService::new(ctx.clone());
    auth.sign_up("ana@example.com", "secret1", None).await.unwrap();
    let token = auth.current_session().unwrap().token.token;

    let resumed = AuthService::resume(ctx.clone(), Some(&token)).await.unwrap();
    assert!(resumed.current_user().is_some());

    auth.logout().await.unwrap();
    assert!(auth.current_user().is_none());
    // A second logout is harmless.
    auth.logout().await.unwrap();

    let resumed = AuthService::resume(ctx, Some(&token)).await.unwrap();
    assert!(resumed.current_user().is_none());
}

#[tokio::test]
async fn test_is_admin_false_without_user() {
    let (ctx, _) = setup().await;
    let auth = AuthService::new(ctx);
    assert!(!auth.is_admin().await.unwrap());
    assert!(!auth.is_verifier().await.unwrap());
}

#[tokio::test]
async fn test_is_admin_sees_claims_granted_after_sign_in() {
    let (ctx, _) = setup().await;
    let auth = AuthService::new(ctx.clone());
    let user = auth.sign_up("ana@example.com", "secret1", None).await.unwrap();
    assert!(!auth.is_admin().await.unwrap());

    let mut claims = Claims::new();
    claims.insert(ADMIN_CLAIM.to_string(), json!(true));
    claims.insert(VERIFIER_CLAIM.to_string(), json!(true));
    ctx.provider.set_custom_claims(&user.uid, &claims).await.unwrap();

    // The verifier check reads the cached token, so it lags until a refresh.
    assert!(!auth.is_verifier().await.unwrap());
    assert!(auth.is_admin().await.unwrap());
    assert!(auth.is_verifier().await.unwrap());
}

#[tokio::test]
async fn test_is_admin_reports_refresh_failure() {
    let (ctx, _) = setup().await;
    let auth = AuthService::new(ctx.clone());
    auth.sign_up("ana@example.com", "secret1", None).await.unwrap();
    let token = auth.current_session().unwrap().token.token;
    ctx.provider.revoke_session(&token).await.unwrap();

    let err = auth.is_admin().await.unwrap_err();
    assert!(matches!(auth_err(err), AuthError::TokenRefreshFailed(_)));
}

#[tokio::test]
async fn test_password_reset_flow() {
    let (ctx, notifier) = setup().await;
    let auth = AuthService::new(ctx.clone());
    auth.sign_up("ana@example.com", "secret1", None).await.unwrap();
    let old_token = auth.current_session().unwrap().token.token;

    let anon = AuthService::new(ctx.clone());
    anon.reset_password("ana@example.com").await.unwrap();
    let code = notifier.last_code().unwrap();

    let err = anon.confirm_password_reset("000000x", "newsecret").await.unwrap_err();
    assert_eq!(auth_err(err), AuthError::InvalidVerificationCode);

    anon.confirm_password_reset(&code, "newsecret").await.unwrap();
    assert!(anon.sign_in("ana@example.com", "secret1").await.is_err());
    anon.sign_in("ana@example.com", "newsecret").await.unwrap();

    // Resetting the password ends existing sessions.
    let resumed = AuthService::resume(ctx, Some(&old_token)).await.unwrap();
    assert!(resumed.current_user().is_none());
}

#[tokio::test]
async fn test_password_reset_unknown_email() {
    let (ctx, notifier) = setup().await;
    let auth = AuthService::new(ctx);
    let err = auth.reset_password("nobody@example.com").await.unwrap_err();
    assert_eq!(auth_err(err), AuthError::UserNotFound);
    assert_eq!(notifier.count(), 0);
}

#[tokio::test]
async fn test_phone_sign_in() {
    let (ctx, notifier) = setup().await;
    let auth = AuthService::new(ctx);

    let challenge = auth.setup_recaptcha("phone-sign-in");
    assert_eq!(challenge.size, "invisible");
    assert_eq!(challenge.site_key.as_deref(), Some("site-key"));

    let verification_id = auth
        .send_phone_verification_code("+94771234567", "captcha-token")
        .await
        .unwrap();
    let code = notifier.last_code().unwrap();
    assert_eq!(code.len(), 6);

    let err = auth.verify_phone_code(&verification_id, "abcdef").await.unwrap_err();
    assert_eq!(auth_err(err), AuthError::InvalidVerificationCode);

    let user = auth.verify_phone_code(&verification_id, &code).await.unwrap();
    assert_eq!(user.phone.as_deref(), Some("+94771234567"));
    assert_eq!(user.provider, SignInProvider::Phone);
    assert!(auth.current_user().is_some());

    // Codes are single use.
    assert!(auth.verify_phone_code(&verification_id, &code).await.is_err());
}

#[tokio::test]
async fn test_phone_code_blocked_by_recaptcha() {
    let (mut ctx, notifier) = setup().await;
    ctx.recaptcha = Arc::new(RejectRecaptcha);
    let auth = AuthService::new(ctx);

    let err = auth
        .send_phone_verification_code("+94771234567", "bot")
        .await
        .unwrap_err();
    assert_eq!(auth_err(err), AuthError::RecaptchaFailed);
    assert_eq!(notifier.count(), 0);

    let err = auth.send_phone_verification_code("call me", "ok").await.unwrap_err();
    assert!(matches!(err, ReliefError::Validation(_)));
}

#[tokio::test]
async fn test_google_sign_in_reuses_account() {
    let (ctx, _) = setup().await;
    let first = AuthService::new(ctx.clone());
    let user = first.sign_in_with_google("good-token").await.unwrap();
    assert_eq!(user.provider, SignInProvider::Google);
    assert_eq!(user.display_name.as_deref(), Some("Gina"));

    let second = AuthService::new(ctx.clone());
    let again = second.sign_in_with_google("good-token").await.unwrap();
    assert_eq!(again.uid, user.uid);

    assert!(second.sign_in_with_google("forged").await.is_err());

    let mut disabled = ctx;
    disabled.google = Arc::new(DisabledGoogleVerifier);
    let err = AuthService::new(disabled)
        .sign_in_with_google("good-token")
        .await
        .unwrap_err();
    assert_eq!(auth_err(err), AuthError::ProviderDisabled);
}
