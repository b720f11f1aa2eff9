//! EmailProcessor - queue handler that delivers `EmailJob`s
//!
//! Implements `queue_worker::MessageHandler<EmailJob>`. Provider failures are
//! mapped onto the retry categories: bad recipients and unbuildable messages
//! are permanent, everything else is retried.

use crate::error::EmailError;
use crate::job::EmailJob;
use crate::provider::EmailProvider;
use async_trait::async_trait;
use core_config::{env_or_default, ConfigError, FromEnv};
use queue_worker::{HandlerError, MessageHandler};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default sender identity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderConfig {
    pub from_email: String,
    pub from_name: String,
}

impl SenderConfig {
    pub fn new(from_email: impl Into<String>, from_name: impl Into<String>) -> Self {
        Self {
            from_email: from_email.into(),
            from_name: from_name.into(),
        }
    }

    /// `Name <address>`
    pub fn formatted(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }
}

impl FromEnv for SenderConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(
            env_or_default("EMAIL_FROM_ADDRESS", "noreply@example.com"),
            env_or_default("EMAIL_FROM_NAME", "Notifications"),
        ))
    }
}

/// Email processor that sends emails using a provider
pub struct EmailProcessor<P: EmailProvider> {
    provider: Arc<P>,
    sender: SenderConfig,
}

impl<P: EmailProvider> EmailProcessor<P> {
    pub fn new(provider: P, sender: SenderConfig) -> Self {
        Self::with_arc_provider(Arc::new(provider), sender)
    }

    /// Share a provider with other components (health checks, tests)
    pub fn with_arc_provider(provider: Arc<P>, sender: SenderConfig) -> Self {
        Self { provider, sender }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Render, validate and send one job
    pub async fn deliver(&self, job: &EmailJob) -> Result<String, EmailError> {
        let email = job.to_email(&self.sender.formatted());
        email.validate()?;

        let result = self.provider.send(&email).await?;
        Ok(result.message_id)
    }
}

#[async_trait]
impl<P: EmailProvider + 'static> MessageHandler<EmailJob> for EmailProcessor<P> {
    async fn handle(&self, job: &EmailJob) -> Result<(), HandlerError> {
        debug!(
            job_id = %job.id,
            email_type = ?job.email_type,
            to = %job.to_email,
            provider = self.provider.name(),
            "Processing email job"
        );

        match self.deliver(job).await {
            Ok(message_id) => {
                info!(
                    job_id = %job.id,
                    message_id = %message_id,
                    to = %job.to_email,
                    "Email sent successfully"
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    to = %job.to_email,
                    category = err.category().as_str(),
                    error = %err,
                    "Email delivery failed"
                );
                Err(err.into())
            }
        }
    }

    fn name(&self) -> &'static str {
        "email_processor"
    }
}
