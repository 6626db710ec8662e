//! Delivery of one-time codes to users.

use async_trait::async_trait;
use tracing::info;

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    PasswordReset { email: String, code: String },
    PhoneCode { phone: String, code: String },
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

/// Writes messages to the log instead of delivering them. Only suitable for
/// development deployments.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        match message {
            OutboundMessage::PasswordReset { email, code } => {
                info!(%email, %code, "password reset code issued");
            }
            OutboundMessage::PhoneCode { phone, code } => {
                info!(%phone, %code, "phone verification code issued");
            }
        }
        Ok(())
    }
}
