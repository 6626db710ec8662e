use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use super::identity::{
    Claims, FederatedIdentity, IdTokenResult, IdentityProvider, SignInProvider, UserRecord,
};
use super::password::{self, MIN_PASSWORD_LEN};
use crate::errors::{AuthError, ReliefError, Result};

/// Wrong guesses allowed on one phone verification before it is discarded.
const MAX_CODE_ATTEMPTS: i64 = 5;
const RESET_CODE_TTL: Duration = Duration::from_secs(3600);

/// Accounts and sessions kept in the same SQLite database as the documents.
pub struct SqliteIdentityProvider {
    pool: SqlitePool,
    session_ttl: Duration,
    phone_code_ttl: Duration,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    uid: String,
    email: Option<String>,
    phone: Option<String>,
    display_name: Option<String>,
    password_hash: Option<String>,
    provider: String,
    claims: String,
}

impl UserRow {
    fn into_record(self) -> Result<UserRecord> {
        let provider = SignInProvider::parse(&self.provider).ok_or_else(|| {
            ReliefError::Storage(format!("user {} has unknown provider {}", self.uid, self.provider))
        })?;
        Ok(UserRecord {
            uid: self.uid,
            email: self.email,
            phone: self.phone,
            display_name: self.display_name,
            provider,
            claims: serde_json::from_str(&self.claims)?,
        })
    }
}

const USER_COLUMNS: &str = "uid, email, phone, display_name, password_hash, provider, claims";

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn expiry(ttl: Duration) -> i64 {
    Utc::now().timestamp() + ttl.as_secs() as i64
}

impl SqliteIdentityProvider {
    pub fn new(pool: SqlitePool, session_ttl: Duration, phone_code_ttl: Duration) -> Self {
        Self {
            pool,
            session_ttl,
            phone_code_ttl,
        }
    }

    async fn user_where(&self, column: &str, value: &str) -> Result<Option<UserRow>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
        Ok(sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_user(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        display_name: Option<&str>,
        password_hash: Option<&str>,
        provider: SignInProvider,
    ) -> Result<UserRecord> {
        let uid = Uuid::new_v4().simple().to_string();
        sqlx::query(
            r#"
            INSERT INTO users (uid, email, phone, display_name, password_hash, provider)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&uid)
        .bind(email)
        .bind(phone)
        .bind(display_name)
        .bind(password_hash)
        .bind(provider.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return ReliefError::Auth(AuthError::EmailAlreadyInUse);
                }
            }
            ReliefError::from(e)
        })?;

        info!(%uid, provider = provider.as_str(), "account created");
        Ok(UserRecord {
            uid,
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            display_name: display_name.map(str::to_string),
            provider,
            claims: Claims::new(),
        })
    }
}

#[async_trait]
impl IdentityProvider for SqliteIdentityProvider {
    async fn create_user(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<UserRecord> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword.into());
        }
        let email = normalize_email(email);
        if self.user_where("email", &email).await?.is_some() {
            return Err(AuthError::EmailAlreadyInUse.into());
        }
        let hash = password::hash_password(password)?;
        self.insert_user(Some(&email), None, display_name, Some(&hash), SignInProvider::Password)
            .await
    }

    async fn verify_password(&self, email: &str, password: &str) -> Result<UserRecord> {
        let row = self
            .user_where("email", &normalize_email(email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        // Federated accounts have no password.
        let matches = row
            .password_hash
            .as_deref()
            .is_some_and(|hash| password::verify_password(password, hash));
        if !matches {
            return Err(AuthError::InvalidCredentials.into());
        }
        row.into_record()
    }

    async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>> {
        self.user_where("uid", uid).await?.map(UserRow::into_record).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.user_where("email", &normalize_email(email))
            .await?
            .map(UserRow::into_record)
            .transpose()
    }

    async fn upsert_federated_user(&self, provider: SignInProvider, identity: &FederatedIdentity) -> Result<UserRecord> {
        let email = identity.email.as_deref().map(normalize_email);
        let existing = match (&email, &identity.phone) {
            (Some(email), _) => self.user_where("email", email).await?,
            (None, Some(phone)) => self.user_where("phone", phone).await?,
            (None, None) => return Err(AuthError::InvalidCredentials.into()),
        };

        match existing {
            Some(row) => {
                if row.display_name.is_none() {
                    if let Some(name) = &identity.display_name {
                        sqlx::query("UPDATE users SET display_name = ?2 WHERE uid = ?1")
                            .bind(&row.uid)
                            .bind(name)
                            .execute(&self.pool)
                            .await?;
                        let mut record = row.into_record()?;
                        record.display_name = Some(name.clone());
                        return Ok(record);
                    }
                }
                row.into_record()
            }
            None => {
                self.insert_user(
                    email.as_deref(),
                    identity.phone.as_deref(),
                    identity.display_name.as_deref(),
                    None,
                    provider,
                )
                .await
            }
        }
    }

    async fn set_custom_claims(&self, uid: &str, claims: &Claims) -> Result<()> {
        let rows = sqlx::query("UPDATE users SET claims = ?2 WHERE uid = ?1")
            .bind(uid)
            .bind(serde_json::to_string(claims)?)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(AuthError::UserNotFound.into());
        }
        info!(%uid, "custom claims updated");
        Ok(())
    }

    async fn issue_session(&self, uid: &str) -> Result<IdTokenResult> {
        let user = self.get_user(uid).await?.ok_or(AuthError::UserNotFound)?;
        let token = password::new_token();
        let expires_at = expiry(self.session_ttl);
        sqlx::query("INSERT INTO sessions (token_hash, uid, expires_at) VALUES (?1, ?2, ?3)")
            .bind(password::digest(&token))
            .bind(uid)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(IdTokenResult {
            token,
            claims: user.claims,
            expires_at: DateTime::from_timestamp(expires_at, 0).unwrap_or_else(Utc::now),
        })
    }

    async fn verify_session(&self, token: &str) -> Result<(UserRecord, IdTokenResult)> {
        let token_hash = password::digest(token);
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT uid, expires_at FROM sessions WHERE token_hash = ?1")
                .bind(&token_hash)
                .fetch_optional(&self.pool)
                .await?;
        let (uid, expires_at) = row.ok_or(AuthError::TokenExpired)?;

        if expires_at <= Utc::now().timestamp() {
            self.revoke_session(token).await?;
            return Err(AuthError::TokenExpired.into());
        }
        let user = self.get_user(&uid).await?.ok_or(AuthError::TokenExpired)?;
        let result = IdTokenResult {
            token: token.to_string(),
            claims: user.claims.clone(),
            expires_at: DateTime::from_timestamp(expires_at, 0).unwrap_or_else(Utc::now),
        };
        Ok((user, result))
    }

    async fn revoke_session(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?1")
            .bind(password::digest(token))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_password_reset(&self, email: &str) -> Result<String> {
        let user = self
            .get_user_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let code = password::new_token();
        sqlx::query("INSERT INTO password_resets (code_hash, uid, expires_at) VALUES (?1, ?2, ?3)")
            .bind(password::digest(&code))
            .bind(&user.uid)
            .bind(expiry(RESET_CODE_TTL))
            .execute(&self.pool)
            .await?;
        Ok(code)
    }

    async fn confirm_password_reset(&self, code: &str, new_password: &str) -> Result<()> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword.into());
        }
        let code_hash = password::digest(code);
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT uid, expires_at FROM password_resets WHERE code_hash = ?1")
                .bind(&code_hash)
                .fetch_optional(&self.pool)
                .await?;
        let (uid, expires_at) = row.ok_or(AuthError::InvalidVerificationCode)?;

        let hash = password::hash_password(new_password)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM password_resets WHERE code_hash = ?1")
            .bind(&code_hash)
            .execute(&mut *tx)
            .await?;
        if expires_at <= Utc::now().timestamp() {
            tx.commit().await?;
            return Err(AuthError::CodeExpired.into());
        }

        sqlx::query("UPDATE users SET password_hash = ?2 WHERE uid = ?1")
            .bind(&uid)
            .bind(&hash)
            .execute(&mut *tx)
            .await?;
        // Existing sessions die with the old password.
        sqlx::query("DELETE FROM sessions WHERE uid = ?1")
            .bind(&uid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(%uid, "password reset");
        Ok(())
    }

    async fn create_phone_verification(&self, phone: &str) -> Result<(String, String)> {
        let verification_id = Uuid::new_v4().simple().to_string();
        let code = password::new_code();
        sqlx::query(
            "INSERT INTO phone_verifications (verification_id, phone, code_hash, expires_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&verification_id)
        .bind(phone)
        .bind(password::digest(&code))
        .bind(expiry(self.phone_code_ttl))
        .execute(&self.pool)
        .await?;
        Ok((verification_id, code))
    }

    async fn consume_phone_verification(&self, verification_id: &str, code: &str) -> Result<String> {
        let row: Option<(String, String, i64, i64)> = sqlx::query_as(
            "SELECT phone, code_hash, expires_at, attempts FROM phone_verifications WHERE verification_id = ?1",
        )
        .bind(verification_id)
        .fetch_optional(&self.pool)
        .await?;
        let (phone, code_hash, expires_at, attempts) = row.ok_or(AuthError::InvalidVerificationCode)?;

        let discard = move || async move {
            sqlx::query("DELETE FROM phone_verifications WHERE verification_id = ?1")
                .bind(verification_id)
                .execute(&self.pool)
                .await
        };

        if expires_at <= Utc::now().timestamp() {
            discard().await?;
            return Err(AuthError::CodeExpired.into());
        }
        if !password::digest_matches(code.trim(), &code_hash) {
            if attempts + 1 >= MAX_CODE_ATTEMPTS {
                discard().await?;
            } else {
                sqlx::query("UPDATE phone_verifications SET attempts = attempts + 1 WHERE verification_id = ?1")
                    .bind(verification_id)
                    .execute(&self.pool)
                    .await?;
            }
            return Err(AuthError::InvalidVerificationCode.into());
        }

        discard().await?;
        Ok(phone)
    }
}
