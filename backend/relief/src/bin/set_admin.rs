//! Grant the `admin` or `verifier` claim to an existing account.
//!
//! ```text
//! DATABASE_URL=sqlite:./relief.db set-admin ana@example.com --dry-run
//! DATABASE_URL=sqlite:./relief.db set-admin ana@example.com --confirm
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use relief::auth::{IdentityProvider, SqliteIdentityProvider};
use relief::config::Config;
use relief::db;
use relief::set_admin::{run, Args};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let database_url = std::env::var("DATABASE_URL").ok();
    let defaults = Config::default();

    let result = run(&args, database_url, |url| async move {
        let pool = db::init_pool(&url).await?;
        let provider: Arc<dyn IdentityProvider> = Arc::new(SqliteIdentityProvider::new(
            pool,
            defaults.session_ttl(),
            defaults.phone_code_ttl(),
        ));
        Ok(provider)
    })
    .await;

    match result {
        Ok(outcome) => {
            let message = outcome.message(args.claim);
            if outcome.exit_code() == 0 {
                println!("{message}");
            } else {
                eprintln!("{message}");
            }
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            eprintln!("Failed to set custom claims: {e}");
            ExitCode::FAILURE
        }
    }
}
