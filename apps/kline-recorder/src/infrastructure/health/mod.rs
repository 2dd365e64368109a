//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, pipeline status reporting, and
//! Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (feed connected and not stopping)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{LoopPhase, Pipeline, PipelineStatus};
use crate::infrastructure::binance::{FeedStatus, FeedStatusSnapshot};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Recorder version.
    pub version: String,
    /// Process uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Kline stream connection.
    pub feed: FeedStatusSnapshot,
    /// Queue and processing loop.
    pub pipeline: PipelineStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed connected and loop collecting.
    Healthy,
    /// Running, but the feed is down or the loop has not started.
    Degraded,
    /// Stopping or stopped.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    pipeline: Arc<Pipeline>,
    feed: Arc<FeedStatus>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, pipeline: Arc<Pipeline>, feed: Arc<FeedStatus>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            pipeline,
            feed,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
#[derive(Debug)]
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        self.serve(listener).await
    }

    /// Serve on an already-bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::ServerFailed` on a fatal server error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        let port = listener.local_addr().map_or(self.port, |a| a.port());
        tracing::info!(port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let is_ready = state.feed.is_connected() && !state.pipeline.status().stop_requested;

    if is_ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = state.feed.snapshot();
    let pipeline = state.pipeline.status();

    HealthResponse {
        status: determine_health_status(&feed, &pipeline),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed,
        pipeline,
    }
}

const fn determine_health_status(
    feed: &FeedStatusSnapshot,
    pipeline: &PipelineStatus,
) -> HealthStatus {
    if pipeline.stop_requested || matches!(pipeline.loop_phase, LoopPhase::Stopped) {
        return HealthStatus::Unhealthy;
    }
    match (feed.connected, pipeline.loop_phase) {
        (true, LoopPhase::Running) => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::application::services::PipelineSettings;
    use crate::infrastructure::binance::KlineJsonDecoder;
    use crate::infrastructure::sink::CsvFileSink;

    fn feed(connected: bool) -> FeedStatusSnapshot {
        FeedStatusSnapshot {
            connected,
            messages_received: 0,
            last_message_at: None,
        }
    }

    fn pipeline_status(stop_requested: bool, loop_phase: LoopPhase) -> PipelineStatus {
        PipelineStatus {
            queue_depth: 0,
            stop_requested,
            loop_phase,
        }
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status_collecting() {
        let status =
            determine_health_status(&feed(true), &pipeline_status(false, LoopPhase::Running));
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn determine_status_partial() {
        assert_eq!(
            determine_health_status(&feed(false), &pipeline_status(false, LoopPhase::Running)),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(&feed(true), &pipeline_status(false, LoopPhase::Idle)),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn determine_status_stopping() {
        assert_eq!(
            determine_health_status(&feed(true), &pipeline_status(true, LoopPhase::Running)),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            determine_health_status(&feed(false), &pipeline_status(false, LoopPhase::Stopped)),
            HealthStatus::Unhealthy
        );
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request =
            format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serves_probes_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(Pipeline::new(
            KlineJsonDecoder::new(),
            CsvFileSink::new(dir.path().join("out.csv")),
            PipelineSettings::default(),
        ));
        let feed = Arc::new(FeedStatus::new());
        let state = Arc::new(HealthServerState::new(
            "test".to_string(),
            Arc::clone(&pipeline),
            Arc::clone(&feed),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(HealthServer::new(0, state, cancel.clone()).serve(listener));

        let live = get(addr, "/healthz").await;
        assert!(live.starts_with("HTTP/1.1 200"));

        let ready = get(addr, "/readyz").await;
        assert!(ready.starts_with("HTTP/1.1 503"));
        assert!(ready.ends_with("NOT READY"));

        feed.set_connected(true);
        let ready = get(addr, "/readyz").await;
        assert!(ready.starts_with("HTTP/1.1 200"));

        let health = get(addr, "/health").await;
        assert!(health.contains("\"status\":\"degraded\""));
        assert!(health.contains("\"loop_phase\":\"idle\""));
        assert!(health.contains("\"version\":\"test\""));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
