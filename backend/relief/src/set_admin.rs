//! `set-admin`: grant the `admin` (or `verifier`) claim to an account.
//!
//! Mutating claims needs `--confirm`; `--dry-run` previews the result.
//! Exit codes: 0 on success, no-op or preview; 1 otherwise.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use clap::{CommandFactory, Parser, ValueEnum};
use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::auth::{has_claim, Claims, IdentityProvider, ADMIN_CLAIM, VERIFIER_CLAIM};
use crate::errors::Result;

#[derive(Parser, Debug, Clone)]
#[command(name = "set-admin")]
#[command(about = "Grant a custom claim to a ReBuild Homes account", long_about = None)]
pub struct Args {
    /// Email address of the account
    pub email: Option<String>,

    /// Actually write the new claims
    #[arg(long)]
    pub confirm: bool,

    /// Print the claims that would be written
    #[arg(long)]
    pub dry_run: bool,

    /// Which claim to grant
    #[arg(long, value_enum, default_value_t = ClaimKind::Admin)]
    pub claim: ClaimKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClaimKind {
    Admin,
    Verifier,
}

impl ClaimKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Admin => ADMIN_CLAIM,
            Self::Verifier => VERIFIER_CLAIM,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    InvalidEmail,
    MissingDatabaseUrl,
    UnknownUser(String),
    AlreadySet { uid: String },
    DryRun { uid: String, claims: Claims },
    NeedsConfirm { uid: String },
    Updated { uid: String, claims: Claims },
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::AlreadySet { .. } | Outcome::DryRun { .. } | Outcome::Updated { .. } => 0,
            _ => 1,
        }
    }

    pub fn message(&self, claim: ClaimKind) -> String {
        let name = claim.name();
        match self {
            Outcome::InvalidEmail => format!("Error: Provide a valid user email.\n\n{}", usage()),
            Outcome::MissingDatabaseUrl => format!("Error: DATABASE_URL not set.\n\n{}", usage()),
            Outcome::UnknownUser(email) => format!("Error: Cannot find user by email: {email}"),
            Outcome::AlreadySet { uid } => format!("User {uid} already has {name}=true. Nothing to change."),
            Outcome::DryRun { uid, claims } => {
                format!("[DRY RUN] Would set claims of {uid} to: {}", Value::Object(claims.clone()))
            }
            Outcome::NeedsConfirm { .. } => "Refusing to modify claims without --confirm flag.\n\
                 Tip: Run with --dry-run to preview changes."
                .to_string(),
            Outcome::Updated { uid, .. } => format!(
                "Success: {name}=true claim set for {uid}.\n\
                 Note: the user's next admin check picks up the new claim."
            ),
        }
    }
}

pub fn usage() -> String {
    Args::command().render_usage().to_string()
}

pub fn is_valid_email(email: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r".+@.+\..+").expect("static regex"))
        .is_match(email)
}

/// Run the tool. `connect` opens the identity store and is only called once
/// the arguments and environment check out.
pub async fn run<C, Fut>(args: &Args, database_url: Option<String>, connect: C) -> Result<Outcome>
where
    C: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<Arc<dyn IdentityProvider>>>,
{
    let Some(email) = args.email.as_deref().filter(|e| is_valid_email(e)) else {
        return Ok(Outcome::InvalidEmail);
    };
    let Some(database_url) = database_url.filter(|u| !u.trim().is_empty()) else {
        return Ok(Outcome::MissingDatabaseUrl);
    };

    let provider = connect(database_url).await?;
    let Some(user) = provider.get_user_by_email(email).await? else {
        return Ok(Outcome::UnknownUser(email.to_string()));
    };

    let name = args.claim.name();
    if has_claim(&user.claims, name) {
        return Ok(Outcome::AlreadySet { uid: user.uid });
    }
    let mut claims = user.claims.clone();
    claims.insert(name.to_string(), Value::Bool(true));

    if args.dry_run && !args.confirm {
        return Ok(Outcome::DryRun { uid: user.uid, claims });
    }
    if !args.confirm {
        return Ok(Outcome::NeedsConfirm { uid: user.uid });
    }

    provider.set_custom_claims(&user.uid, &claims).await?;
    info!(uid = %user.uid, claim = name, "claim granted");
    Ok(Outcome::Updated { uid: user.uid, claims })
}
