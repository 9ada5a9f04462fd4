// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::client::ConnectionRegistry;
use crate::config::Config;
use crate::core::PagePulseError;
use crate::core::analytics::session::ClientMetadata;
use crate::core::analytics::{AnalyticsEngine, AnalyticsWorker};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, reload};

pub type LogReloadHandle = Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>;

/// Contains all initialized components required to spawn the server's background tasks.
/// This struct is created once during server initialization and then consumed by the spawner.
pub struct ServerInit {
    /// The fully initialized, shared server state.
    pub state: Arc<ServerState>,
    /// The single writer for the analytics engine. Must be spawned before any
    /// mutation is awaited.
    pub analytics_worker: AnalyticsWorker,
}

/// The central struct holding all shared, server-wide state.
///
/// Transport and reporting layers only ever talk to the analytics core through
/// this struct: `connect_visitor`, `disconnect_visitor`, the `analytics` handle
/// for navigation events and reads, and `registry` for live presence.
#[derive(Debug)]
pub struct ServerState {
    /// The server's runtime configuration. The log level can change at runtime.
    pub config: Arc<Mutex<Config>>,
    /// Live connections and the visitor count derived from them.
    pub registry: ConnectionRegistry,
    /// Handle to the aggregation engine.
    pub analytics: AnalyticsEngine,
    /// A handle to the logging filter, allowing for dynamic log level changes.
    pub log_reload_handle: LogReloadHandle,
}

impl ServerState {
    /// Initializes the entire server state from the given configuration.
    pub fn initialize(
        config: Config,
        log_reload_handle: LogReloadHandle,
    ) -> Result<ServerInit, PagePulseError> {
        let (analytics, analytics_worker) = AnalyticsEngine::new(config.analytics.clone());

        info!(
            "Analytics engine initialized (reset every {}, active window {}).",
            humantime_serde::re::humantime::format_duration(config.analytics.reset_interval),
            humantime_serde::re::humantime::format_duration(config.analytics.active_window),
        );

        let state = Arc::new(Self {
            config: Arc::new(Mutex::new(config)),
            registry: ConnectionRegistry::new(),
            analytics,
            log_reload_handle,
        });

        Ok(ServerInit {
            state,
            analytics_worker,
        })
    }

    /// Registers a new connection and records its metadata on the visitor's session.
    /// Returns `false` (and changes nothing) if the id is already registered.
    pub async fn connect_visitor(
        &self,
        id: &str,
        meta: ClientMetadata,
    ) -> Result<bool, PagePulseError> {
        if !self
            .registry
            .connect(id, &meta.remote_addr, &meta.user_agent, &meta.origin)
        {
            return Ok(false);
        }
        info!(
            "Visitor connected: {} (ip: {}, origin: {}). Live count: {}",
            id,
            meta.remote_addr,
            meta.origin,
            self.registry.live_count()
        );
        self.analytics.record_client_info(id, meta).await?;
        Ok(true)
    }

    /// Removes a connection and closes the visitor's open page visit.
    pub async fn disconnect_visitor(&self, id: &str) -> Result<(), PagePulseError> {
        if self.registry.disconnect(id) {
            info!(
                "Visitor disconnected: {}. Live count: {}",
                id,
                self.registry.live_count()
            );
        }
        self.analytics.disconnect(id).await
    }

    /// Synchronous variant of `disconnect_visitor` for use in `Drop`.
    pub fn disconnect_visitor_nowait(&self, id: &str) {
        if self.registry.disconnect(id) {
            info!(
                "Visitor disconnected: {}. Live count: {}",
                id,
                self.registry.live_count()
            );
        }
        self.analytics.disconnect_nowait(id);
    }

    /// Swaps the active log filter and records the new level in the config.
    pub async fn set_log_level(&self, level: &str) -> Result<(), PagePulseError> {
        let new_filter = EnvFilter::try_new(level)
            .map_err(|e| PagePulseError::InvalidRequest(format!("invalid log level: {e}")))?;
        if let Err(e) = self.log_reload_handle.reload(new_filter) {
            let err_msg = format!("Failed to reload log level: {e}");
            error!("{err_msg}");
            return Err(PagePulseError::Internal(err_msg));
        }
        self.config.lock().await.log_level = level.to_string();
        info!("Log level dynamically changed to '{}'", level);
        Ok(())
    }
}
