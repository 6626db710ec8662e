//! ReBuild Homes relief service: entry point.
//!
//! Opens the SQLite database (documents and identities), the attachment
//! directory, and serves the Axum API.

use std::sync::Arc;

use reqwest::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relief::config::Config;
use relief::{build_router, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    let pool = db::init_pool(&config.database_url).await?;
    tokio::fs::create_dir_all(&config.storage_root).await?;

    // Outbound calls to Google and reCAPTCHA.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let addr = format!("0.0.0.0:{}", config.api_port);
    let state = Arc::new(AppState::from_config(config, pool, client).await?);
    let app = build_router(state);

    info!("API listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
