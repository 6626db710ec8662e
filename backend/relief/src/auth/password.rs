//! Secrets at rest: Argon2id PHC strings for passwords and plain SHA-256
//! for high-entropy tokens and short-lived codes.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::errors::{ReliefError, Result};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Hash `password` into a self-describing PHC string (algorithm, params, salt).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| ReliefError::Crypto(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ReliefError::Crypto(e.to_string()))?;
    Ok(hash.to_string())
}

/// A malformed stored hash never matches.
pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Opaque 256-bit bearer token.
pub fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Six-digit one-time code.
pub fn new_code() -> String {
    format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000)
}

pub fn digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Compare `secret` against a stored [`digest`] without leaking timing.
pub fn digest_matches(secret: &str, expected_hex: &str) -> bool {
    digest(secret).as_bytes().ct_eq(expected_hex.as_bytes()).into()
}
