//! In-process queue transport
//!
//! Used by tests and local runs. Received messages move to an in-flight set
//! until deleted; [`InMemoryTransport::redeliver`] plays the role of an
//! expired visibility timeout. Receive never long-polls.

use super::{QueueMessage, QueueTransport, ReceiptHandle};
use crate::error::{TransportError, TransportOp};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
}

#[derive(Debug, Default)]
struct State {
    visible: HashMap<String, VecDeque<StoredMessage>>,
    in_flight: HashMap<String, Vec<(ReceiptHandle, StoredMessage)>>,
    deleted: HashMap<String, Vec<ReceiptHandle>>,
    failures: HashMap<(TransportOp, String), String>,
    calls: HashMap<(TransportOp, String), usize>,
    next_id: u64,
}

impl State {
    fn record_call(&mut self, op: TransportOp, endpoint: &str) -> Result<(), TransportError> {
        *self.calls.entry((op, endpoint.to_string())).or_default() += 1;
        match self.failures.get(&(op, endpoint.to_string())) {
            Some(message) => Err(TransportError::new(op, endpoint, message.clone())),
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory queue transport that records every call
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<State>>,
}

impl InMemoryTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message without counting it as a `send` call
    pub async fn push(&self, endpoint: &str, body: impl Into<String>) {
        let mut state = self.state.lock().await;
        let id = format!("msg-{}", state.next_id());
        state
            .visible
            .entry(endpoint.to_string())
            .or_default()
            .push_back(StoredMessage {
                id,
                body: body.into(),
            });
    }

    /// Bodies currently visible on a queue, in order
    pub async fn messages(&self, endpoint: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .visible
            .get(endpoint)
            .map(|queue| queue.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of received but not yet deleted messages
    pub async fn in_flight_count(&self, endpoint: &str) -> usize {
        self.state
            .lock()
            .await
            .in_flight
            .get(endpoint)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Receipt handles deleted from a queue, in order
    pub async fn deleted(&self, endpoint: &str) -> Vec<ReceiptHandle> {
        self.state
            .lock()
            .await
            .deleted
            .get(endpoint)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of calls made for an operation against an endpoint
    pub async fn call_count(&self, op: TransportOp, endpoint: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&(op, endpoint.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Make every `op` against `endpoint` fail with `message`
    pub async fn fail_on(&self, op: TransportOp, endpoint: &str, message: impl Into<String>) {
        self.state
            .lock()
            .await
            .failures
            .insert((op, endpoint.to_string()), message.into());
    }

    /// Remove an injected failure
    pub async fn clear_failure(&self, op: TransportOp, endpoint: &str) {
        self.state
            .lock()
            .await
            .failures
            .remove(&(op, endpoint.to_string()));
    }

    /// Return all in-flight messages to the front of the queue, as if their
    /// visibility timeout expired. Redelivered messages get new receipt handles.
    pub async fn redeliver(&self, endpoint: &str) -> usize {
        let mut state = self.state.lock().await;
        let in_flight = state.in_flight.remove(endpoint).unwrap_or_default();
        let count = in_flight.len();
        let queue = state.visible.entry(endpoint.to_string()).or_default();
        for (_, message) in in_flight.into_iter().rev() {
            queue.push_front(message);
        }
        count
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn receive(
        &self,
        endpoint: &str,
        max_messages: usize,
        _wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, TransportError> {
        let mut state = self.state.lock().await;
        state.record_call(TransportOp::Receive, endpoint)?;

        let mut taken = Vec::new();
        if let Some(queue) = state.visible.get_mut(endpoint) {
            while taken.len() < max_messages {
                match queue.pop_front() {
                    Some(message) => taken.push(message),
                    None => break,
                }
            }
        }

        let mut received = Vec::with_capacity(taken.len());
        for message in taken {
            let handle = ReceiptHandle::new(format!("receipt-{}", state.next_id()));
            received.push(QueueMessage::new(message.body.clone(), handle.clone()).with_message_id(&message.id));
            state
                .in_flight
                .entry(endpoint.to_string())
                .or_default()
                .push((handle, message));
        }

        debug!(endpoint = %endpoint, count = received.len(), "Received messages (in-memory)");
        Ok(received)
    }

    async fn delete(&self, endpoint: &str, receipt_handle: &ReceiptHandle) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.record_call(TransportOp::Delete, endpoint)?;

        // Unknown handles are accepted, matching SQS for already-deleted receipts
        if let Some(in_flight) = state.in_flight.get_mut(endpoint) {
            in_flight.retain(|(handle, _)| handle != receipt_handle);
        }
        state
            .deleted
            .entry(endpoint.to_string())
            .or_default()
            .push(receipt_handle.clone());
        Ok(())
    }

    async fn send(&self, endpoint: &str, body: &str) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().await;
            state.record_call(TransportOp::Send, endpoint)?;
        }
        self.push(endpoint, body).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_moves_messages_in_flight() {
        let transport = InMemoryTransport::new();
        for i in 0..3 {
            transport.push("q", format!("body-{}", i)).await;
        }

        let received = transport.receive("q", 2, Duration::ZERO).await.unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].body, "body-0");
        assert_eq!(transport.messages("q").await, vec!["body-2".to_string()]);
        assert_eq!(transport.in_flight_count("q").await, 2);

        transport.delete("q", &received[0].receipt_handle).await.unwrap();
        assert_eq!(transport.in_flight_count("q").await, 1);
        assert_eq!(transport.deleted("q").await, vec![received[0].receipt_handle.clone()]);
    }

    #[tokio::test]
    async fn test_redeliver_assigns_new_handles() {
        let transport = InMemoryTransport::new();
        transport.push("q", "a").await;

        let first = transport.receive("q", 10, Duration::ZERO).await.unwrap();
        assert_eq!(transport.redeliver("q").await, 1);

        let second = transport.receive("q", 10, Duration::ZERO).await.unwrap();
        assert_eq!(second[0].body, "a");
        assert_eq!(second[0].message_id, first[0].message_id);
        assert_ne!(second[0].receipt_handle, first[0].receipt_handle);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let transport = InMemoryTransport::new();
        transport.fail_on(TransportOp::Send, "dlq", "throttled").await;

        let err = transport.send("dlq", "x").await.unwrap_err();
        assert_eq!(err.operation, TransportOp::Send);
        assert!(transport.messages("dlq").await.is_empty());
        assert_eq!(transport.call_count(TransportOp::Send, "dlq").await, 1);

        transport.clear_failure(TransportOp::Send, "dlq").await;
        transport.send("dlq", "x").await.unwrap();
        assert_eq!(transport.messages("dlq").await, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_unknown_handle_is_ok() {
        let transport = InMemoryTransport::new();
        assert!(transport.delete("q", &ReceiptHandle::new("nope")).await.is_ok());
    }
}
