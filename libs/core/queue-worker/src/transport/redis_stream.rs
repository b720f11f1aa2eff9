//! Redis Streams transport
//!
//! Maps the queue contract onto a stream plus consumer group:
//! - receive: `XREADGROUP ... BLOCK <wait> COUNT <n> STREAMS <stream> >`
//! - delete: `XACK` followed by `XDEL`
//! - send: `XADD <stream> MAXLEN ~ <max> * job <body>`
//!
//! The receipt handle is the stream entry id.
//!
//! `ConnectionManager` times out responses after 500 ms by default, which is
//! shorter than a blocking read. Build the manager with
//! [`RedisStreamTransport::connection_config`]; a block that still times out
//! is reported as an empty receive.

use super::{QueueMessage, QueueTransport, ReceiptHandle};
use crate::error::TransportError;
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{RedisError, RedisResult};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Field that carries the payload in every stream entry
const PAYLOAD_FIELD: &str = "job";

/// Slack on top of the BLOCK window before a response counts as lost
const RESPONSE_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

type StreamReadReply = Vec<(String, Vec<(String, Vec<(String, String)>)>)>;

/// Queue transport backed by Redis Streams consumer groups
pub struct RedisStreamTransport {
    redis: ConnectionManager,
    consumer_group: String,
    consumer_id: String,
    max_length: i64,
    initialized: Mutex<HashSet<String>>,
}

impl RedisStreamTransport {
    /// Create a new transport reading as `consumer_id` within `consumer_group`
    pub fn new(
        redis: ConnectionManager,
        consumer_group: impl Into<String>,
        consumer_id: impl Into<String>,
    ) -> Self {
        Self {
            redis,
            consumer_group: consumer_group.into(),
            consumer_id: consumer_id.into(),
            max_length: 100_000,
            initialized: Mutex::new(HashSet::new()),
        }
    }

    /// Manager config whose response timeout outlasts a `max_wait` BLOCK
    pub fn connection_config(max_wait: Duration) -> ConnectionManagerConfig {
        ConnectionManagerConfig::new().set_response_timeout(Some(max_wait + RESPONSE_TIMEOUT_MARGIN))
    }

    /// Set the approximate MAXLEN applied on send
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    /// Create the consumer group on first use of a stream
    async fn ensure_group(&self, stream: &str) -> RedisResult<()> {
        let mut initialized = self.initialized.lock().await;
        if initialized.contains(stream) {
            return Ok(());
        }

        let mut conn = self.redis.clone();
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(&self.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                info!(stream = %stream, group = %self.consumer_group, "Created consumer group");
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream = %stream, group = %self.consumer_group, "Consumer group already exists");
            }
            Err(e) => return Err(e),
        }

        initialized.insert(stream.to_string());
        Ok(())
    }

    /// Turn an XREADGROUP reply into queue messages.
    ///
    /// Entries without a payload field are kept with an empty body so the
    /// decoder rejects them and they reach the dead-letter queue.
    fn parse_reply(reply: StreamReadReply) -> Vec<QueueMessage> {
        let mut messages = Vec::new();

        for (_stream, entries) in reply {
            for (entry_id, fields) in entries {
                let body = match fields.into_iter().find(|(k, _)| k == PAYLOAD_FIELD) {
                    Some((_, value)) => value,
                    None => {
                        warn!(entry_id = %entry_id, "Missing '{}' field in stream entry", PAYLOAD_FIELD);
                        String::new()
                    }
                };
                messages.push(
                    QueueMessage::new(body, ReceiptHandle::new(entry_id.clone())).with_message_id(entry_id),
                );
            }
        }

        messages
    }
}

/// A blocking read whose response timed out client-side found nothing
fn is_block_timeout(err: &RedisError, block_ms: u64) -> bool {
    block_ms > 0 && err.is_timeout()
}

#[async_trait]
impl QueueTransport for RedisStreamTransport {
    async fn receive(
        &self,
        endpoint: &str,
        max_messages: usize,
        wait_time: Duration,
    ) -> Result<Vec<QueueMessage>, TransportError> {
        self.ensure_group(endpoint)
            .await
            .map_err(|e| TransportError::receive(endpoint, e.to_string()))?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(&self.consumer_group).arg(&self.consumer_id);

        let block_ms = wait_time.as_millis() as u64;
        if block_ms > 0 {
            cmd.arg("BLOCK").arg(block_ms);
        }

        cmd.arg("COUNT").arg(max_messages.max(1)).arg("STREAMS").arg(endpoint).arg(">");

        let mut conn = self.redis.clone();
        let reply: Option<StreamReadReply> = match cmd.query_async(&mut conn).await {
            Ok(reply) => reply,
            Err(e) if is_block_timeout(&e, block_ms) => {
                debug!(endpoint = %endpoint, "BLOCK timeout - no messages");
                None
            }
            Err(e) => return Err(TransportError::receive(endpoint, e.to_string())),
        };

        // None means the BLOCK window elapsed with nothing to read
        let messages = reply.map(Self::parse_reply).unwrap_or_default();
        debug!(endpoint = %endpoint, count = messages.len(), "Received messages from Redis stream");
        Ok(messages)
    }

    async fn delete(&self, endpoint: &str, receipt_handle: &ReceiptHandle) -> Result<(), TransportError> {
        let mut conn = self.redis.clone();

        let _: i64 = redis::cmd("XACK")
            .arg(endpoint)
            .arg(&self.consumer_group)
            .arg(receipt_handle.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| TransportError::delete(endpoint, e.to_string()))?;

        let _: i64 = redis::cmd("XDEL")
            .arg(endpoint)
            .arg(receipt_handle.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| TransportError::delete(endpoint, e.to_string()))?;

        debug!(endpoint = %endpoint, entry_id = %receipt_handle, "Acknowledged and deleted stream entry");
        Ok(())
    }

    async fn send(&self, endpoint: &str, body: &str) -> Result<(), TransportError> {
        let mut conn = self.redis.clone();

        let entry_id: String = redis::cmd("XADD")
            .arg(endpoint)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|e| TransportError::send(endpoint, e.to_string()))?;

        debug!(endpoint = %endpoint, entry_id = %entry_id, "Added stream entry");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
