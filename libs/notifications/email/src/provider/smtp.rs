//! SMTP email provider using lettre

use super::{EmailProvider, SendResult};
use crate::error::{EmailError, EmailResult};
use crate::models::Email;
use async_trait::async_trait;
use core_config::{env_or_default, env_parse, env_required, ConfigError, FromEnv};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tracing::debug;

/// SMTP provider configuration
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub use_tls: bool,
}

impl SmtpConfig {
    /// Mailpit/Mailhog on localhost:1025 without authentication
    pub fn local() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1025,
            username: String::new(),
            password: String::new(),
            from_email: "noreply@localhost".to_string(),
            from_name: "Development".to_string(),
            use_tls: false,
        }
    }
}

impl FromEnv for SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_required("SMTP_HOST")?,
            port: env_parse("SMTP_PORT", 587)?,
            username: env_or_default("SMTP_USERNAME", ""),
            password: env_or_default("SMTP_PASSWORD", ""),
            from_email: env_required("EMAIL_FROM_ADDRESS")?,
            from_name: env_or_default("EMAIL_FROM_NAME", "Notifications"),
            use_tls: env_parse("SMTP_USE_TLS", true)?,
        })
    }
}

/// SMTP email provider
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: Arc<SmtpConfig>,
}

impl SmtpProvider {
    pub fn new(config: SmtpConfig) -> EmailResult<Self> {
        let transport = if config.use_tls {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| EmailError::Config(format!("Failed to create SMTP relay: {}", e)))?
                .credentials(creds)
                .port(config.port)
                .build()
        } else if !config.username.is_empty() {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .credentials(creds)
                .port(config.port)
                .build()
        } else {
            // No auth (Mailpit/Mailhog)
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .build()
        };

        Ok(Self {
            transport,
            config: Arc::new(config),
        })
    }

    fn mailbox(address: &str, what: &str) -> EmailResult<Mailbox> {
        address
            .parse()
            .map_err(|e| EmailError::InvalidRecipient(format!("Invalid {} address '{}': {}", what, address, e)))
    }

    fn build_message(&self, email: &Email) -> EmailResult<Message> {
        let from = match &email.from {
            Some(from) => from.clone(),
            None => format!("{} <{}>", self.config.from_name, self.config.from_email),
        };
        let from: Mailbox = from
            .parse()
            .map_err(|e| EmailError::Config(format!("Invalid from address: {}", e)))?;

        let mut builder = Message::builder()
            .from(from)
            .to(Self::mailbox(&email.to, "to")?)
            .subject(&email.subject);

        if let Some(reply_to) = &email.reply_to {
            builder = builder.reply_to(Self::mailbox(reply_to, "reply-to")?);
        }
        for cc in &email.cc {
            builder = builder.cc(Self::mailbox(cc, "cc")?);
        }
        for bcc in &email.bcc {
            builder = builder.bcc(Self::mailbox(bcc, "bcc")?);
        }

        let message = match (&email.body_text, &email.body_html) {
            (Some(text), Some(html)) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            ),
            (Some(text), None) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
            (None, Some(html)) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
            (None, None) => {
                return Err(EmailError::InvalidMessage(
                    "Email must have either text or HTML body".to_string(),
                ));
            }
        };

        message.map_err(|e| EmailError::InvalidMessage(e.to_string()))
    }
}

fn map_smtp_error(err: lettre::transport::smtp::Error) -> EmailError {
    let code = err.status().map(|code| code.to_string());
    classify_smtp_reply(code.as_deref(), err.to_string())
}

/// Only replies that reject the recipient are permanent (550/551/553 and
/// enhanced status 5.1.x). Auth replies map to `Auth`; everything else,
/// other 5xx included, is left to `EmailError::classify`.
fn classify_smtp_reply(code: Option<&str>, message: String) -> EmailError {
    match code {
        Some("530" | "534" | "535") => EmailError::Auth(message),
        Some("550" | "551" | "553") => EmailError::InvalidRecipient(message),
        Some(c) if c.starts_with('5') && message.contains(" 5.1.") => {
            EmailError::InvalidRecipient(message)
        }
        _ => EmailError::classify(message),
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send(&self, email: &Email) -> EmailResult<SendResult> {
        let message = self.build_message(email)?;

        let response = self.transport.send(message).await.map_err(map_smtp_error)?;

        let message_id = response
            .message()
            .next()
            .map(|s| s.to_string())
            .unwrap_or_else(|| email.id.clone());

        debug!(email_id = %email.id, to = %email.to, "Email sent via SMTP");

        Ok(SendResult { message_id })
    }

    async fn health_check(&self) -> EmailResult<()> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(EmailError::Provider("SMTP server did not respond to NOOP".to_string())),
            Err(e) => Err(EmailError::Provider(format!("SMTP health check failed: {}", e))),
        }
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
