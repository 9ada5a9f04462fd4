// src/server/initialization.rs

//! Handles the server initialization process, from state setup to binding the listener.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::{LogReloadHandle, ServerState};
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config, log_reload_handle: LogReloadHandle) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let server_init = ServerState::initialize(config.clone(), log_reload_handle)?;
    info!("Server state initialized.");

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!("PagePulse server listening on {}:{}", config.host, config.port);

    Ok(ServerContext {
        state: server_init.state,
        analytics_worker: Some(server_init.analytics_worker),
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

fn log_startup_info(config: &Config) {
    info!("Starting PagePulse v{}", env!("CARGO_PKG_VERSION"));
    info!("Accepting up to {} concurrent visitors.", config.max_clients);
    if config.metrics.enabled {
        info!("Metrics will be exposed on port {}.", config.metrics.port);
    }
}
