// src/server/connection_loop.rs

//! Contains the main serve loop for the HTTP/WebSocket listener and graceful shutdown.

use super::context::ServerContext;
use super::http::{self, AppState};
use anyhow::anyhow;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

/// Serves the router until a signal, a failed background task or a listener
/// error, then shuts everything down in order.
pub async fn run(mut ctx: ServerContext) -> anyhow::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    let max_clients = ctx.state.config.lock().await.max_clients;
    let app = http::router(AppState {
        state: ctx.state.clone(),
        shutdown_tx: ctx.shutdown_tx.clone(),
        max_clients,
    });

    let mut serve_shutdown_rx = ctx.shutdown_tx.subscribe();
    let listener = ctx.listener;
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            serve_shutdown_rx.recv().await.ok();
        })
        .await
    });

    let mut server_done = false;
    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = &mut server => {
                server_done = true;
                match res {
                    Ok(Ok(())) => warn!("HTTP server stopped unexpectedly."),
                    Ok(Err(e)) => error!("CRITICAL: HTTP server failed: {}. Shutting down.", e),
                    Err(e) => error!("CRITICAL: HTTP server task panicked: {e:?}. Shutting down."),
                }
                break;
            }
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
    }

    if !server_done {
        match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
            Ok(_) => info!("All client connections closed."),
            Err(_) => {
                warn!("Timed out waiting for client connections to close.");
                server.abort();
            }
        }
    }

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Server shutdown complete.");
    Ok(())
}
