//! Email provider implementations

pub mod mock;
pub mod ses;
pub mod smtp;

pub use mock::MockEmailProvider;
pub use ses::SesProvider;
pub use smtp::{SmtpConfig, SmtpProvider};

use crate::error::EmailResult;
use crate::models::Email;
use async_trait::async_trait;

/// Result of sending an email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    /// Provider-specific message ID
    pub message_id: String,
}

/// Trait for email providers
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send an email
    async fn send(&self, email: &Email) -> EmailResult<SendResult>;

    /// Check if the provider is reachable
    async fn health_check(&self) -> EmailResult<()>;

    fn name(&self) -> &'static str;
}

#[async_trait]
impl<P: EmailProvider + ?Sized> EmailProvider for std::sync::Arc<P> {
    async fn send(&self, email: &Email) -> EmailResult<SendResult> {
        (**self).send(email).await
    }

    async fn health_check(&self) -> EmailResult<()> {
        (**self).health_check().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
