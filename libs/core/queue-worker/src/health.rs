//! Health check handlers for the poll worker.
//!
//! - Liveness check (`/health`)
//! - Readiness check (`/ready`): fails while the last cycle aborted
//! - Prometheus metrics (`/metrics`)
//! - Worker status (`/status`)

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::metrics;
use crate::worker::{StatusSnapshot, WorkerStatus};

/// Shared state for health endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub app_name: String,
    pub app_version: String,
    pub status: WorkerStatus,
}

impl HealthState {
    pub fn new(app_name: impl Into<String>, app_version: impl Into<String>, status: WorkerStatus) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            status,
        }
    }
}

/// Health response for liveness checks.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: String,
    pub version: String,
}

/// Liveness check handler.
///
/// Always returns OK if the server is running.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: state.app_name,
        version: state.app_version,
    })
}

/// Readiness check handler.
pub async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, Json<Value>) {
    let snapshot = state.status.snapshot().await;

    if snapshot.is_ready() {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "last_cycle_at": snapshot.last_cycle_at,
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "error": snapshot.last_error,
            })),
        )
    }
}

/// Prometheus metrics handler.
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        metrics::render_metrics(),
    )
}

/// Full worker status
pub async fn status_handler(State(state): State<HealthState>) -> Json<StatusSnapshot> {
    Json(state.status.snapshot().await)
}

/// Build the health router.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}
