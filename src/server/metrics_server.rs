// src/server/metrics_server.rs

use crate::core::metrics::{self, gather_metrics};
use crate::core::state::ServerState;
use anyhow::Context;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Handles HTTP requests to the /metrics endpoint.
///
/// The live visitor gauge is refreshed from the registry before gathering, so
/// the scrape never lags behind a dropped broadcast.
async fn metrics_handler(state: Arc<ServerState>) -> impl IntoResponse {
    metrics::LIVE_VISITORS.set(state.registry.live_count() as f64);

    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Runs a simple HTTP server to expose Prometheus metrics on /metrics.
pub async fn run_metrics_server(
    state: Arc<ServerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let (host, port) = {
        let config = state.config.lock().await;
        (config.host.clone(), config.metrics.port)
    };

    let app = Router::new().route("/metrics", get(move || metrics_handler(state.clone())));

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind metrics server on port {port}"))?;
    let addr: SocketAddr = listener.local_addr()?;
    info!(
        "Prometheus metrics server listening on http://{}/metrics",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics server shutting down.");
        })
        .await
        .context("Metrics server failed")
}
