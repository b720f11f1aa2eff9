//! Prometheus metrics for the poll pipeline

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder.
///
/// Call this once at startup. Subsequent calls are no-ops; if another
/// recorder is already installed the failure is logged and metrics are
/// simply not rendered.
pub fn init_metrics() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_ok() {
                info!("Prometheus metrics initialized");
            }
        }
        Err(e) => warn!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Pipeline metrics labelled by handler name
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    handler: String,
}

impl PipelineMetrics {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
        }
    }

    pub fn messages_received(&self, queue: &str, count: usize) {
        counter!(
            "queue_worker_messages_received_total",
            "queue" => queue.to_string(),
            "handler" => self.handler.clone()
        )
        .increment(count as u64);
    }

    pub fn message_succeeded(&self, queue: &str, duration: Duration) {
        counter!(
            "queue_worker_messages_processed_total",
            "queue" => queue.to_string(),
            "handler" => self.handler.clone(),
            "status" => "success"
        )
        .increment(1);

        histogram!(
            "queue_worker_message_duration_seconds",
            "queue" => queue.to_string(),
            "handler" => self.handler.clone()
        )
        .record(duration.as_secs_f64());
    }

    pub fn message_retried(&self, queue: &str) {
        counter!(
            "queue_worker_messages_retried_total",
            "queue" => queue.to_string(),
            "handler" => self.handler.clone()
        )
        .increment(1);
    }

    pub fn message_dead_lettered(&self, queue: &str, reason: &str) {
        counter!(
            "queue_worker_messages_dead_lettered_total",
            "queue" => queue.to_string(),
            "handler" => self.handler.clone(),
            "reason" => reason.to_string()
        )
        .increment(1);
    }

    /// Message left the cycle without success; `kind` is the failure label
    pub fn message_failed(&self, queue: &str, kind: &str) {
        counter!(
            "queue_worker_messages_processed_total",
            "queue" => queue.to_string(),
            "handler" => self.handler.clone(),
            "status" => "failed"
        )
        .increment(1);

        counter!(
            "queue_worker_message_errors_total",
            "queue" => queue.to_string(),
            "handler" => self.handler.clone(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    pub fn cycle_completed(&self, queue: &str, duration: Duration) {
        counter!(
            "queue_worker_cycles_total",
            "queue" => queue.to_string(),
            "status" => "completed"
        )
        .increment(1);

        histogram!(
            "queue_worker_cycle_duration_seconds",
            "queue" => queue.to_string()
        )
        .record(duration.as_secs_f64());
    }

    pub fn cycle_aborted(&self, queue: &str) {
        counter!(
            "queue_worker_cycles_total",
            "queue" => queue.to_string(),
            "status" => "aborted"
        )
        .increment(1);
    }

    pub fn cycle_skipped(&self, queue: &str) {
        counter!(
            "queue_worker_cycles_total",
            "queue" => queue.to_string(),
            "status" => "skipped"
        )
        .increment(1);
    }
}
