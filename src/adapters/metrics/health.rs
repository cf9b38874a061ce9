//! Health Check Server - Liveness, Readiness and Status
//!
//! Exposes /live, /ready and /status via axum 0.7 for Docker health
//! checks and dashboards. Readiness and the status document come from
//! a `HealthProbe`, implemented by the trader service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Source of readiness and status for the health endpoints.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// True when the service is not degraded.
    async fn is_ready(&self) -> bool;

    /// Status document served on /status.
    async fn status_document(&self) -> serde_json::Value;
}

/// State shared with the axum handlers.
#[derive(Clone)]
struct HealthState {
    probe: Arc<dyn HealthProbe>,
    shutting_down: Arc<AtomicBool>,
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    probe: Arc<dyn HealthProbe>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(probe: Arc<dyn HealthProbe>, port: u16) -> Self {
        Self { probe, port }
    }

    fn router(&self, shutting_down: Arc<AtomicBool>) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/status", get(Self::status))
            .with_state(HealthState {
                probe: Arc::clone(&self.probe),
                shutting_down,
            })
    }

    /// Run the health server until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let shutting_down = Arc::new(AtomicBool::new(false));
        let app = self.router(Arc::clone(&shutting_down));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                shutting_down.store(true, Ordering::Relaxed);
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 503 while degraded or shutting down.
    async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
        if !state.shutting_down.load(Ordering::Relaxed) && state.probe.is_ready().await {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }

    async fn status(State(state): State<HealthState>) -> impl IntoResponse {
        Json(state.probe.status_document().await)
    }
}
