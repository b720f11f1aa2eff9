//! Dead-letter routing
//!
//! Messages that cannot be handled are wrapped in a [`DeadLetterEntry`] and
//! sent to a secondary queue. The source message is only deleted by the
//! caller once the send has been confirmed.

use crate::error::TransportError;
use crate::transport::{QueueMessage, QueueTransport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Why a message was dead-lettered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Handler failed on every allowed attempt
    Exhausted,
    /// Body could not be decoded
    Malformed,
    /// Handler reported a failure that will never succeed
    Permanent,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::Exhausted => "exhausted",
            DeadLetterReason::Malformed => "malformed",
            DeadLetterReason::Permanent => "permanent",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document sent to the dead-letter queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Body exactly as received from the source queue
    pub original_body: String,
    pub source_queue: String,
    pub message_id: Option<String>,
    pub reason: DeadLetterReason,
    /// Last error observed
    pub error: String,
    /// Handler invocations made before giving up
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Sends failed messages to the configured dead-letter queue
#[derive(Clone)]
pub struct DeadLetterRouter {
    transport: Arc<dyn QueueTransport>,
    dead_letter_queue: String,
}

impl DeadLetterRouter {
    pub fn new(transport: Arc<dyn QueueTransport>, dead_letter_queue: impl Into<String>) -> Self {
        Self {
            transport,
            dead_letter_queue: dead_letter_queue.into(),
        }
    }

    /// Dead-letter endpoint
    pub fn dead_letter_queue(&self) -> &str {
        &self.dead_letter_queue
    }

    /// Send `message` to the dead-letter queue.
    ///
    /// Relocating the same message twice produces two entries; the queue is
    /// at-least-once, so consumers of the DLQ must tolerate duplicates.
    pub async fn relocate(
        &self,
        source_queue: &str,
        message: &QueueMessage,
        reason: DeadLetterReason,
        error: &str,
        attempts: u32,
    ) -> Result<DeadLetterEntry, TransportError> {
        let entry = DeadLetterEntry {
            original_body: message.body.clone(),
            source_queue: source_queue.to_string(),
            message_id: message.message_id.clone(),
            reason,
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
        };

        let body = serde_json::to_string(&entry)
            .map_err(|e| TransportError::send(&self.dead_letter_queue, e.to_string()))?;

        self.transport.send(&self.dead_letter_queue, &body).await?;

        info!(
            message_id = %message.log_id(),
            source = %source_queue,
            dlq = %self.dead_letter_queue,
            reason = %reason,
            attempts,
            error = %error,
            "Moved message to dead-letter queue"
        );

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportOp;
    use crate::transport::{InMemoryTransport, ReceiptHandle};

    fn message() -> QueueMessage {
        QueueMessage::new(r#"{"to":"a@b.c"}"#, ReceiptHandle::new("rh-1")).with_message_id("m-1")
    }

    #[tokio::test]
    async fn test_relocate_sends_entry() {
        let transport = InMemoryTransport::new();
        let router = DeadLetterRouter::new(Arc::new(transport.clone()), "dlq");

        let entry = router
            .relocate("source", &message(), DeadLetterReason::Exhausted, "smtp timeout", 3)
            .await
            .unwrap();
        assert_eq!(entry.attempts, 3);

        let sent = transport.messages("dlq").await;
        assert_eq!(sent.len(), 1);
        let decoded: DeadLetterEntry = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.original_body, r#"{"to":"a@b.c"}"#);
        assert_eq!(decoded.message_id.as_deref(), Some("m-1"));
    }

    #[tokio::test]
    async fn test_relocate_reports_send_failure() {
        let transport = InMemoryTransport::new();
        transport.fail_on(TransportOp::Send, "dlq", "access denied").await;
        let router = DeadLetterRouter::new(Arc::new(transport.clone()), "dlq");

        let err = router
            .relocate("source", &message(), DeadLetterReason::Malformed, "bad json", 0)
            .await
            .unwrap_err();
        assert_eq!(err.operation, TransportOp::Send);
        assert_eq!(err.endpoint, "dlq");
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DeadLetterReason::Permanent).unwrap(),
            "\"permanent\""
        );
    }
}
