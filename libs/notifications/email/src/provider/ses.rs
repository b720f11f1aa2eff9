//! AWS SES (Simple Email Service) provider
//!
//! Sends emails via the SES v2 API. The client is built from an explicit
//! [`AwsConfig`]; unset fields fall back to the SDK default chain.

use super::{EmailProvider, SendResult};
use crate::error::{EmailError, EmailResult};
use crate::models::Email;
use async_trait::async_trait;
use aws_sdk_sesv2::error::{DisplayErrorContext, SdkError};
use aws_sdk_sesv2::operation::send_email::SendEmailError;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client;
use core_config::aws::AwsConfig;
use tracing::{debug, error};

/// AWS SES email provider
pub struct SesProvider {
    client: Client,
    from_email: String,
    from_name: String,
}

impl SesProvider {
    /// Create a new SesProvider with an existing AWS SES client
    pub fn new(client: Client, from_email: impl Into<String>, from_name: impl Into<String>) -> Self {
        Self {
            client,
            from_email: from_email.into(),
            from_name: from_name.into(),
        }
    }

    /// Build the SES client from configuration
    pub async fn from_config(
        config: &AwsConfig,
        from_email: impl Into<String>,
        from_name: impl Into<String>,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(aws_sdk_sesv2::config::Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "core_config",
            ));
        }

        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config), from_email, from_name)
    }

    /// Format email address with name
    fn format_address(email: &str, name: Option<&str>) -> String {
        match name {
            Some(n) if !n.is_empty() => format!("{} <{}>", n, email),
            _ => email.to_string(),
        }
    }

    fn content(data: &str) -> EmailResult<Content> {
        Content::builder()
            .data(data)
            .charset("UTF-8")
            .build()
            .map_err(|e| EmailError::InvalidMessage(e.to_string()))
    }

    fn map_send_error<R>(err: SdkError<SendEmailError, R>) -> EmailError
    where
        R: std::fmt::Debug,
    {
        let message = DisplayErrorContext(&err).to_string();
        match err.as_service_error() {
            Some(SendEmailError::BadRequestException(_)) | Some(SendEmailError::MessageRejected(_)) => {
                EmailError::InvalidMessage(message)
            }
            Some(SendEmailError::TooManyRequestsException(_))
            | Some(SendEmailError::LimitExceededException(_)) => EmailError::RateLimited(message),
            Some(_) => EmailError::Provider(message),
            None => EmailError::classify(message),
        }
    }
}

#[async_trait]
impl EmailProvider for SesProvider {
    async fn send(&self, email: &Email) -> EmailResult<SendResult> {
        let mut destination = Destination::builder().to_addresses(&email.to);
        for cc in &email.cc {
            destination = destination.cc_addresses(cc);
        }
        for bcc in &email.bcc {
            destination = destination.bcc_addresses(bcc);
        }

        let mut body = Body::builder();
        if let Some(text) = &email.body_text {
            body = body.text(Self::content(text)?);
        }
        if let Some(html) = &email.body_html {
            body = body.html(Self::content(html)?);
        }

        let message = Message::builder()
            .subject(Self::content(&email.subject)?)
            .body(body.build())
            .build();

        let from_address = match &email.from {
            Some(from) => from.clone(),
            None => Self::format_address(&self.from_email, Some(&self.from_name)),
        };

        debug!(to = %email.to, from = %from_address, "Sending email via AWS SES");

        let mut request = self
            .client
            .send_email()
            .from_email_address(&from_address)
            .destination(destination.build())
            .content(EmailContent::builder().simple(message).build());

        if let Some(reply_to) = &email.reply_to {
            request = request.reply_to_addresses(reply_to);
        }

        let response = request.send().await.map_err(|e| {
            let err = Self::map_send_error(e);
            error!(error = %err, "AWS SES send failed");
            err
        })?;

        let message_id = response.message_id().unwrap_or(&email.id).to_string();
        debug!(message_id = %message_id, "Email sent via AWS SES");

        Ok(SendResult { message_id })
    }

    async fn health_check(&self) -> EmailResult<()> {
        // GetAccount confirms credentials and SES access
        self.client
            .get_account()
            .send()
            .await
            .map_err(|e| EmailError::classify(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "aws-ses"
    }
}
