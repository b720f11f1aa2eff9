//! Worker configuration
//!
//! This module provides `WorkerConfig` for configuring the poll worker.
//! Values come either from the builder methods or from the environment via
//! [`FromEnv`].

use crate::retry::{Backoff, RetryPolicy};
use core_config::{env_or_default, env_parse, env_required, ConfigError, FromEnv};
use std::str::FromStr;
use std::time::Duration;

/// Largest batch a single SQS receive call can return
pub const SQS_MAX_RECEIVE: usize = 10;

/// Which queue service backs the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Sqs,
    Redis,
    Memory,
}

impl FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqs" => Ok(QueueBackend::Sqs),
            "redis" => Ok(QueueBackend::Redis),
            "memory" | "in-memory" => Ok(QueueBackend::Memory),
            other => Err(format!("unknown queue backend '{}'", other)),
        }
    }
}

/// Configuration for the poll worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue backend to connect to
    pub backend: QueueBackend,

    /// Source queue endpoint (SQS queue URL or Redis stream name)
    pub source_queue: String,

    /// Dead letter queue endpoint
    pub dead_letter_queue: String,

    /// Max messages requested per receive call
    pub max_messages_per_receive: usize,

    /// Long-poll wait for the receive call
    pub wait_time: Duration,

    /// Hard cap on messages processed per cycle
    pub max_messages_per_cycle: usize,

    /// Retries after the first attempt before dead-lettering
    pub max_retries: u32,

    /// Delay between attempts
    pub backoff: Backoff,

    /// Cron expression for the scheduled trigger
    pub cron: String,
}

impl WorkerConfig {
    /// Create a new WorkerConfig with default tuning
    pub fn new(source_queue: impl Into<String>, dead_letter_queue: impl Into<String>) -> Self {
        Self {
            backend: QueueBackend::Sqs,
            source_queue: source_queue.into(),
            dead_letter_queue: dead_letter_queue.into(),
            max_messages_per_receive: SQS_MAX_RECEIVE,
            wait_time: Duration::from_secs(20),
            max_messages_per_cycle: 20,
            max_retries: 2,
            backoff: Backoff::Fixed(Duration::from_millis(9000)),
            cron: "0 * * * * *".to_string(),
        }
    }

    /// Set the queue backend
    pub fn with_backend(mut self, backend: QueueBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the number of messages requested per receive call
    pub fn with_max_messages_per_receive(mut self, count: usize) -> Self {
        self.max_messages_per_receive = count.max(1);
        self
    }

    /// Set the long-poll wait time
    pub fn with_wait_time(mut self, wait: Duration) -> Self {
        self.wait_time = wait;
        self
    }

    /// Set the per-cycle processing cap
    pub fn with_max_messages_per_cycle(mut self, count: usize) -> Self {
        self.max_messages_per_cycle = count.max(1);
        self
    }

    /// Set the maximum retries after the first attempt
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the retry backoff
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set a fixed retry delay
    pub fn with_retry_delay(self, delay: Duration) -> Self {
        self.with_backoff(Backoff::Fixed(delay))
    }

    /// Set the cron schedule
    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = cron.into();
        self
    }

    /// Retry policy derived from this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff)
    }

    /// Check invariants that the builder cannot enforce on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_queue.is_empty() {
            return Err(ConfigError::Invalid {
                key: "QUEUE_SOURCE_URL".to_string(),
                details: "must not be empty".to_string(),
            });
        }
        if self.source_queue == self.dead_letter_queue {
            return Err(ConfigError::Invalid {
                key: "QUEUE_DLQ_URL".to_string(),
                details: "dead letter queue must differ from the source queue".to_string(),
            });
        }
        if self.backend == QueueBackend::Sqs && self.max_messages_per_receive > SQS_MAX_RECEIVE {
            return Err(ConfigError::Invalid {
                key: "QUEUE_MAX_MESSAGES_PER_RECEIVE".to_string(),
                details: format!("SQS returns at most {} messages per call", SQS_MAX_RECEIVE),
            });
        }
        Ok(())
    }
}

impl FromEnv for WorkerConfig {
    /// Requires QUEUE_SOURCE_URL and QUEUE_DLQ_URL; everything else has a default
    fn from_env() -> Result<Self, ConfigError> {
        let backend = env_or_default("QUEUE_BACKEND", "sqs")
            .parse::<QueueBackend>()
            .map_err(|details| ConfigError::ParseError {
                key: "QUEUE_BACKEND".to_string(),
                details,
            })?;

        let config = Self::new(env_required("QUEUE_SOURCE_URL")?, env_required("QUEUE_DLQ_URL")?)
            .with_backend(backend)
            .with_max_messages_per_receive(env_parse("QUEUE_MAX_MESSAGES_PER_RECEIVE", SQS_MAX_RECEIVE)?)
            .with_wait_time(Duration::from_secs(env_parse("QUEUE_WAIT_TIME_SECS", 20)?))
            .with_max_messages_per_cycle(env_parse("QUEUE_MAX_MESSAGES_PER_CYCLE", 20)?)
            .with_max_retries(env_parse("QUEUE_MAX_RETRIES", 2)?)
            .with_retry_delay(Duration::from_millis(env_parse("QUEUE_RETRY_DELAY_MS", 9000)?))
            .with_cron(env_or_default("QUEUE_CRON", "0 * * * * *"));

        config.validate()?;
        Ok(config)
    }
}
