// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use crate::core::tasks::reset::ResetScheduler;
use anyhow::{Result, anyhow};
use tracing::info;

/// Spawns all critical background tasks into the provided JoinSet.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let server_state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    let config_clone = server_state.config.lock().await.clone();

    // --- Analytics Writer ---
    let worker = ctx
        .analytics_worker
        .take()
        .ok_or_else(|| anyhow!("Analytics writer task was already spawned"))?;
    let shutdown_rx_worker = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        worker.run(shutdown_rx_worker).await;
        Ok(())
    });

    // --- Scheduled Reset ---
    let scheduler = ResetScheduler::new(
        server_state.analytics.clone(),
        config_clone.analytics.reset_interval,
    );
    let shutdown_rx_reset = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        scheduler.run(shutdown_rx_reset).await;
        Ok(())
    });

    // --- Metrics Server ---
    if config_clone.metrics.enabled {
        let metrics_state = server_state.clone();
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx_metrics).await
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
