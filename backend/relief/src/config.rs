//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ReliefError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database holding documents and the identity store
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Externally visible origin, used to build file download URLs
    pub public_base_url: String,
    /// Directory under which uploaded attachments are kept
    pub storage_root: PathBuf,
    /// Lifetime of an issued session token
    pub session_ttl_secs: u64,
    /// Lifetime of a phone verification code
    pub phone_code_ttl_secs: u64,
    /// How long a client should show a success message before navigating away
    pub redirect_delay_ms: u64,
    /// OAuth client id that Google ID tokens must be issued for
    pub google_client_id: Option<String>,
    pub recaptcha_site_key: Option<String>,
    pub recaptcha_secret: Option<String>,
    /// Insert demo applications and a demo donor into an empty store
    pub seed_demo_data: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_port: u16 = parse_or("API_PORT", 3001)?;
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./relief.db".to_string()),
            api_port,
            public_base_url: env_var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{api_port}"))
                .trim_end_matches('/')
                .to_string(),
            storage_root: env_var("STORAGE_ROOT")
                .unwrap_or_else(|_| "./storage".to_string())
                .into(),
            session_ttl_secs: parse_or("SESSION_TTL_SECS", 3600)?,
            phone_code_ttl_secs: parse_or("PHONE_CODE_TTL_SECS", 300)?,
            redirect_delay_ms: parse_or("REDIRECT_DELAY_MS", 3000)?,
            google_client_id: optional("GOOGLE_CLIENT_ID"),
            recaptcha_site_key: optional("RECAPTCHA_SITE_KEY"),
            recaptcha_secret: optional("RECAPTCHA_SECRET"),
            seed_demo_data: parse_or("SEED_DEMO_DATA", false)?,
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn phone_code_ttl(&self) -> Duration {
        Duration::from_secs(self.phone_code_ttl_secs)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            api_port: 3001,
            public_base_url: "http://localhost:3001".to_string(),
            storage_root: "./storage".into(),
            session_ttl_secs: 3600,
            phone_code_ttl_secs: 300,
            redirect_delay_ms: 3000,
            google_client_id: None,
            recaptcha_site_key: None,
            recaptcha_secret: None,
            seed_demo_data: false,
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ReliefError::Config(format!("Missing env var: {key}")))
}

fn optional(key: &str) -> Option<String> {
    env_var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ReliefError::Config(format!("Invalid {key}"))),
        Err(_) => Ok(default),
    }
}
