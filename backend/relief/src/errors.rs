//! Application-wide error types.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Field name → list of human-readable validation messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum ReliefError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Password hashing error: {0}")]
    Crypto(String),
}

/// Failures raised by the identity provider, worded for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("An account with this email already exists.")]
    EmailAlreadyInUse,

    #[error("Password should be at least 6 characters.")]
    WeakPassword,

    #[error("The email address is badly formatted.")]
    InvalidEmail,

    #[error("There is no user record corresponding to this identifier.")]
    UserNotFound,

    #[error("The verification code is invalid.")]
    InvalidVerificationCode,

    #[error("The verification code has expired. Request a new one.")]
    CodeExpired,

    #[error("Your session has expired. Please sign in again.")]
    TokenExpired,

    #[error("Could not refresh your session: {0}")]
    TokenRefreshFailed(String),

    #[error("reCAPTCHA verification failed.")]
    RecaptchaFailed,

    #[error("This sign-in method is not enabled.")]
    ProviderDisabled,

    #[error("A network error occurred: {0}")]
    Network(String),
}

pub type Result<T> = std::result::Result<T, ReliefError>;

impl ReliefError {
    /// Build a validation error for a single field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::Validation(errors)
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Auth(AuthError::EmailAlreadyInUse) => StatusCode::CONFLICT,
            Self::Auth(AuthError::Network(_)) => StatusCode::BAD_GATEWAY,
            Self::Auth(
                AuthError::WeakPassword
                | AuthError::InvalidEmail
                | AuthError::InvalidVerificationCode
                | AuthError::CodeExpired
                | AuthError::RecaptchaFailed,
            ) => StatusCode::BAD_REQUEST,
            Self::Auth(AuthError::UserNotFound) => StatusCode::NOT_FOUND,
            Self::Auth(AuthError::ProviderDisabled) => StatusCode::NOT_IMPLEMENTED,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}

impl IntoResponse for ReliefError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Validation(fields) => json!({ "error": self.to_string(), "fields": fields }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
