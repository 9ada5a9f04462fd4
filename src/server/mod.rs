// src/server/mod.rs

use crate::config::Config;
use crate::core::state::LogReloadHandle;
use anyhow::Result;

mod connection_loop;
mod context;
pub mod http;
mod initialization;
mod metrics_server;
mod spawner;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config, log_reload_handle: LogReloadHandle) -> Result<()> {
    // 1. Initialize server state and bind the listener.
    let mut server_context = initialization::setup(config, log_reload_handle).await?;

    // 2. Spawn all background tasks, the analytics writer first.
    spawner::spawn_all(&mut server_context).await?;

    // 3. Serve until shutdown.
    connection_loop::run(server_context).await
}
