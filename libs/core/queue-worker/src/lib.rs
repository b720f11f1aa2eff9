//! Queue Worker
//!
//! Polls a managed message queue on a schedule and runs each message
//! through a handler, with bounded retries and a dead-letter queue.
//!
//! ## Features
//!
//! - **Transport-agnostic**: `QueueTransport` over SQS, Redis Streams or memory
//! - **Retry state machine**: fixed or exponential delay, permanent failures short-circuit
//! - **Dead Letter Queue**: messages are deleted only after success or confirmed relocation
//! - **Single-flight cycles**: overlapping triggers are skipped
//! - **Prometheus metrics** and **health endpoints**
//!
//! ## Example
//!
//! ```ignore
//! use queue_worker::{PollWorker, SqsTransport, WorkerConfig};
//!
//! let config = WorkerConfig::from_env()?;
//! let transport = Arc::new(SqsTransport::from_config(&aws).await);
//! let worker = Arc::new(PollWorker::new(config, transport, Arc::new(processor)));
//!
//! let report = worker.run_cycle().await?;
//! ```

mod config;
mod decoder;
mod dlq;
mod error;
mod handler;
mod health;
pub mod metrics;
pub mod retry;
mod scheduler;
pub mod transport;
mod worker;

// Re-export main types
pub use config::{QueueBackend, WorkerConfig, SQS_MAX_RECEIVE};
pub use decoder::{JsonDecoder, MessageDecoder};
pub use dlq::{DeadLetterEntry, DeadLetterReason, DeadLetterRouter};
pub use error::{
    CycleError, DecodeError, ErrorCategory, HandlerError, MessageError, TransportError, TransportOp,
};
pub use handler::MessageHandler;
pub use health::{health_router, HealthState};
pub use metrics::{init_metrics, PipelineMetrics};
pub use retry::{Backoff, RetryController, RetryPolicy};
pub use scheduler::{run_scheduled, SchedulerError};
pub use transport::{
    InMemoryTransport, QueueMessage, QueueTransport, ReceiptHandle, RedisStreamTransport,
    SqsTransport,
};
pub use worker::{CycleReport, MessageFailure, PollWorker, StatusSnapshot, WorkerStatus};
