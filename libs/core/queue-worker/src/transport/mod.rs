//! Queue transport boundary
//!
//! A thin contract over receive / delete / send. Implementations map their
//! native failures to [`TransportError`] and never retry on their own.

mod in_memory;
mod redis_stream;
mod sqs;

pub use in_memory::InMemoryTransport;
pub use redis_stream::RedisStreamTransport;
pub use sqs::SqsTransport;

use crate::error::TransportError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Opaque token identifying one delivery of a message.
///
/// Redelivery of the same message yields a new handle, so this is not a
/// message identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Envelope as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Raw serialized payload
    pub body: String,
    /// Token required to delete this delivery
    pub receipt_handle: ReceiptHandle,
    /// Transport-assigned message id, for logging only
    pub message_id: Option<String>,
}

impl QueueMessage {
    pub fn new(body: impl Into<String>, receipt_handle: ReceiptHandle) -> Self {
        Self {
            body: body.into(),
            receipt_handle,
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Identifier used in logs: the message id if known, else the receipt handle
    pub fn log_id(&self) -> &str {
        self.message_id
            .as_deref()
            .unwrap_or_else(|| self.receipt_handle.as_str())
    }
}

/// Queue service operations used by the pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Receive up to `max_messages`, waiting at most `wait_time` for the first one
    async fn receive(
        &self,
        endpoint: &str,
        max_messages: usize,
        wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, TransportError>;

    /// Remove the delivery identified by `receipt_handle` from the queue
    async fn delete(&self, endpoint: &str, receipt_handle: &ReceiptHandle) -> Result<(), TransportError>;

    /// Enqueue a new message with the given body
    async fn send(&self, endpoint: &str, body: &str) -> Result<(), TransportError>;

    /// Backend name for logs and metrics
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_id_prefers_message_id() {
        let message = QueueMessage::new("{}", ReceiptHandle::new("rh-1"));
        assert_eq!(message.log_id(), "rh-1");

        let message = message.with_message_id("msg-1");
        assert_eq!(message.log_id(), "msg-1");
    }
}
