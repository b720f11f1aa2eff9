//! AWS SQS transport
//!
//! The client is built from an explicit [`AwsConfig`]; nothing is read from
//! process-wide state after construction.

use super::{QueueMessage, QueueTransport, ReceiptHandle};
use crate::config::SQS_MAX_RECEIVE;
use crate::error::TransportError;
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;
use core_config::aws::AwsConfig;
use std::time::Duration;
use tracing::{debug, warn};

/// SQS caps long polling at 20 seconds
const SQS_MAX_WAIT_SECS: u64 = 20;

/// Queue transport backed by AWS SQS
#[derive(Clone)]
pub struct SqsTransport {
    client: Client,
}

impl SqsTransport {
    /// Wrap an existing SQS client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from configuration.
    ///
    /// Falls back to the AWS SDK default credential chain when no static
    /// keys are configured (IRSA, instance profile, shared credentials file).
    pub async fn from_config(config: &AwsConfig) -> Self {
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
            let credentials = aws_sdk_sqs::config::Credentials::new(
                access_key_id,
                secret_access_key,
                None, // session token
                None, // expiry
                "core_config",
            );
            loader = loader.credentials_provider(credentials);
        }

        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config))
    }

    /// Convert an SQS message, dropping ones that cannot be deleted later
    fn convert(endpoint: &str, message: aws_sdk_sqs::types::Message) -> Option<QueueMessage> {
        let Some(receipt_handle) = message.receipt_handle else {
            warn!(
                endpoint = %endpoint,
                message_id = ?message.message_id,
                "SQS message without receipt handle, skipping"
            );
            return None;
        };

        let mut converted = QueueMessage::new(
            message.body.unwrap_or_default(),
            ReceiptHandle::new(receipt_handle),
        );
        converted.message_id = message.message_id;
        Some(converted)
    }
}

#[async_trait]
impl QueueTransport for SqsTransport {
    async fn receive(
        &self,
        endpoint: &str,
        max_messages: usize,
        wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, TransportError> {
        let max_messages = max_messages.clamp(1, SQS_MAX_RECEIVE) as i32;
        let wait_secs = wait_time.as_secs().min(SQS_MAX_WAIT_SECS) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(endpoint)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_secs)
            .send()
            .await
            .map_err(|e| TransportError::receive(endpoint, DisplayErrorContext(&e).to_string()))?;

        let messages: Vec<QueueMessage> = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| Self::convert(endpoint, m))
            .collect();

        debug!(endpoint = %endpoint, count = messages.len(), "Received messages from SQS");
        Ok(messages)
    }

    async fn delete(&self, endpoint: &str, receipt_handle: &ReceiptHandle) -> Result<(), TransportError> {
        self.client
            .delete_message()
            .queue_url(endpoint)
            .receipt_handle(receipt_handle.as_str())
            .send()
            .await
            .map_err(|e| TransportError::delete(endpoint, DisplayErrorContext(&e).to_string()))?;

        debug!(endpoint = %endpoint, "Deleted SQS message");
        Ok(())
    }

    async fn send(&self, endpoint: &str, body: &str) -> Result<(), TransportError> {
        let output = self
            .client
            .send_message()
            .queue_url(endpoint)
            .message_body(body)
            .send()
            .await
            .map_err(|e| TransportError::send(endpoint, DisplayErrorContext(&e).to_string()))?;

        debug!(endpoint = %endpoint, message_id = ?output.message_id(), "Sent SQS message");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_sqs::types::Message;

    #[test]
    fn test_convert_keeps_handle_and_id() {
        let message = Message::builder()
            .message_id("m-1")
            .receipt_handle("rh-1")
            .body("{\"a\":1}")
            .build();

        let converted = SqsTransport::convert("q", message).unwrap();
        assert_eq!(converted.body, "{\"a\":1}");
        assert_eq!(converted.receipt_handle.as_str(), "rh-1");
        assert_eq!(converted.message_id.as_deref(), Some("m-1"));
    }

    #[test]
    fn test_convert_drops_message_without_handle() {
        let message = Message::builder().message_id("m-2").body("x").build();
        assert!(SqsTransport::convert("q", message).is_none());
    }

    #[test]
    fn test_convert_missing_body_is_empty() {
        let message = Message::builder().receipt_handle("rh-3").build();
        let converted = SqsTransport::convert("q", message).unwrap();
        assert!(converted.body.is_empty());
    }
}
