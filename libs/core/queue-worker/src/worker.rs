//! Poll cycle orchestration
//!
//! One call to [`PollWorker::run_cycle`] is one cycle:
//! - receive a single batch from the source queue
//! - cap it at `max_messages_per_cycle`
//! - run each message through the [`RetryController`], one at a time
//!
//! A receive failure aborts the cycle. Per-message failures are logged and
//! recorded in the [`CycleReport`] without affecting sibling messages.
//! Overlapping calls are refused by a single-flight guard.

use crate::config::WorkerConfig;
use crate::decoder::{JsonDecoder, MessageDecoder};
use crate::dlq::DeadLetterRouter;
use crate::error::{CycleError, MessageError};
use crate::handler::MessageHandler;
use crate::metrics::PipelineMetrics;
use crate::retry::RetryController;
use crate::transport::{QueueMessage, QueueTransport};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// One message that did not complete successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageFailure {
    pub message_id: String,
    /// Short failure label (`exhausted`, `malformed`, ...)
    pub kind: String,
    pub error: String,
    /// Whether the message reached the dead-letter queue
    pub dead_lettered: bool,
}

impl MessageFailure {
    fn new(message: &QueueMessage, err: &MessageError) -> Self {
        Self {
            message_id: message.log_id().to_string(),
            kind: err.kind().to_string(),
            error: err.to_string(),
            dead_lettered: err.was_dead_lettered(),
        }
    }
}

/// Summary of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Messages returned by the receive call
    pub received: usize,
    /// Messages run through the retry controller
    pub processed: usize,
    pub succeeded: usize,
    pub dead_lettered: usize,
    pub failures: Vec<MessageFailure>,
    /// The cycle did not run because another one was in progress
    pub skipped: bool,
}

impl CycleReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn received(count: usize) -> Self {
        Self {
            received: count,
            ..Self::default()
        }
    }
}

/// Snapshot of the worker's most recent activity
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub cycle_running: bool,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_report: Option<CycleReport>,
}

impl StatusSnapshot {
    /// Healthy until the most recent cycle aborts
    pub fn is_ready(&self) -> bool {
        self.last_error.is_none()
    }
}

/// Shared, cloneable view of worker status for health endpoints
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl WorkerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().await.clone()
    }

    async fn cycle_started(&self) {
        self.inner.write().await.cycle_running = true;
    }

    async fn cycle_completed(&self, report: &CycleReport) {
        let mut status = self.inner.write().await;
        status.cycle_running = false;
        status.cycles_completed += 1;
        status.last_cycle_at = Some(Utc::now());
        status.last_error = None;
        status.last_report = Some(report.clone());
    }

    async fn cycle_failed(&self, err: &CycleError) {
        let mut status = self.inner.write().await;
        status.cycle_running = false;
        status.cycles_failed += 1;
        status.last_cycle_at = Some(Utc::now());
        status.last_error = Some(err.to_string());
    }
}

/// Poll cycle orchestrator for payloads of type `P`
pub struct PollWorker<P> {
    config: WorkerConfig,
    transport: Arc<dyn QueueTransport>,
    controller: RetryController<P>,
    handler_name: &'static str,
    metrics: PipelineMetrics,
    status: WorkerStatus,
    in_flight: Mutex<()>,
}

impl<P> PollWorker<P>
where
    P: DeserializeOwned + Send + Sync + 'static,
{
    /// Create a worker that decodes message bodies as JSON
    pub fn new(
        config: WorkerConfig,
        transport: Arc<dyn QueueTransport>,
        handler: Arc<dyn MessageHandler<P>>,
    ) -> Self {
        Self::with_decoder(config, transport, Arc::new(JsonDecoder::<P>::new()), handler)
    }
}

impl<P> PollWorker<P>
where
    P: Send + Sync + 'static,
{
    /// Create a worker with a custom decoder
    pub fn with_decoder(
        config: WorkerConfig,
        transport: Arc<dyn QueueTransport>,
        decoder: Arc<dyn MessageDecoder<P>>,
        handler: Arc<dyn MessageHandler<P>>,
    ) -> Self {
        let router = DeadLetterRouter::new(transport.clone(), config.dead_letter_queue.clone());
        let handler_name = handler.name();
        let controller = RetryController::new(
            transport.clone(),
            decoder,
            handler,
            router,
            config.retry_policy(),
        );

        Self {
            config,
            transport,
            controller,
            handler_name,
            metrics: PipelineMetrics::new(handler_name),
            status: WorkerStatus::new(),
            in_flight: Mutex::new(()),
        }
    }

    /// Share an existing status handle, e.g. one already given to the health server
    pub fn with_status(mut self, status: WorkerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.clone()
    }

    /// Run one cycle against the configured source queue
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        self.run_cycle_on(&self.config.source_queue).await
    }

    /// Run one cycle against `endpoint`
    #[instrument(
        skip(self),
        fields(transport = self.transport.name(), handler = self.handler_name)
    )]
    pub async fn run_cycle_on(&self, endpoint: &str) -> Result<CycleReport, CycleError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("Previous poll cycle still running, skipping");
            self.metrics.cycle_skipped(endpoint);
            return Ok(CycleReport::skipped());
        };

        let started = Instant::now();
        self.status.cycle_started().await;

        let messages = match self
            .transport
            .receive(
                endpoint,
                self.config.max_messages_per_receive,
                self.config.wait_time,
            )
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                let err = CycleError::Receive(e);
                error!(error = %err, "Poll cycle aborted");
                self.metrics.cycle_aborted(endpoint);
                self.status.cycle_failed(&err).await;
                return Err(err);
            }
        };

        let mut report = CycleReport::received(messages.len());
        if messages.is_empty() {
            debug!("No messages received");
            self.metrics.cycle_completed(endpoint, started.elapsed());
            self.status.cycle_completed(&report).await;
            return Ok(report);
        }

        self.metrics.messages_received(endpoint, messages.len());
        if messages.len() > self.config.max_messages_per_cycle {
            debug!(
                received = messages.len(),
                cap = self.config.max_messages_per_cycle,
                "Batch exceeds per-cycle cap, remainder left for redelivery"
            );
        }

        for message in messages.iter().take(self.config.max_messages_per_cycle) {
            report.processed += 1;

            match self.controller.process(endpoint, message).await {
                Ok(()) => {
                    debug!(message_id = %message.log_id(), "Message processed");
                    report.succeeded += 1;
                }
                Err(err) => {
                    error!(
                        message_id = %message.log_id(),
                        kind = err.kind(),
                        error = %err,
                        "Message processing failed"
                    );
                    self.metrics.message_failed(endpoint, err.kind());
                    if err.was_dead_lettered() {
                        report.dead_lettered += 1;
                    }
                    report.failures.push(MessageFailure::new(message, &err));
                }
            }
        }

        info!(
            received = report.received,
            succeeded = report.succeeded,
            dead_lettered = report.dead_lettered,
            failed = report.failures.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Poll cycle complete"
        );
        self.metrics.cycle_completed(endpoint, started.elapsed());
        self.status.cycle_completed(&report).await;

        Ok(report)
    }
}
