// src/core/tasks/reset.rs

//! A background task that clears all analytics on a fixed interval.

use crate::core::analytics::AnalyticsEngine;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

/// The background task struct for the scheduled reset.
pub struct ResetScheduler {
    engine: AnalyticsEngine,
    interval: Duration,
}

impl ResetScheduler {
    pub fn new(engine: AnalyticsEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// The main run loop. The reset is queued behind every pending event, so
    /// it never interleaves with a half-applied page-view or disconnect.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Analytics reset scheduler started (every {}).",
            humantime_serde::re::humantime::format_duration(self.interval)
        );
        // The first tick of a plain interval fires immediately; the window
        // starts now, so the first reset is one full period away.
        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.engine.reset().await {
                        Ok(at) => info!("Scheduled analytics reset completed at {}.", at.to_rfc3339()),
                        Err(e) => {
                            warn!("Scheduled analytics reset failed: {}. Scheduler stopping.", e);
                            return;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Analytics reset scheduler shutting down.");
                    return;
                }
            }
        }
    }
}
