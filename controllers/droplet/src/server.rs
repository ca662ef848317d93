//! HTTP server for metrics and probes.

use crate::error::ControllerError;
use crate::metrics;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

/// Shared probe state
#[derive(Debug, Clone, Default)]
pub struct ServerState {
    /// Set once the watchers are running
    pub is_ready: Arc<AtomicBool>,
}

impl ServerState {
    pub fn mark_ready(&self) {
        self.is_ready.store(true, Ordering::Relaxed);
    }
}

/// Routes for `/metrics`, `/healthz` and `/readyz`
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// Serve until the process exits
pub async fn start_server(port: u16, state: ServerState) -> Result<(), ControllerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Server(format!("failed to bind {addr}: {e}")))?;
    info!("Metrics and probe server listening on {}", addr);

    axum::serve(listener, router(state))
        .await
        .map_err(|e| ControllerError::Server(e.to_string()))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                e.to_string(),
            )
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<ServerState>) -> (StatusCode, &'static str) {
    if state.is_ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
