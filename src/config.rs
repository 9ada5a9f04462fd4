// src/config.rs

//! Manages server configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Settings for the aggregation engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    /// How often all sessions and page aggregates are cleared.
    #[serde(with = "humantime_serde", default = "default_reset_interval")]
    pub reset_interval: Duration,
    /// A session counts as active if its last page-view is newer than this.
    #[serde(with = "humantime_serde", default = "default_active_window")]
    pub active_window: Duration,
    /// List length used when a report request has no usable `limit`.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// List length of the page rankings in the overview report.
    #[serde(default = "default_overview_limit")]
    pub overview_limit: usize,
    /// Bounded capacity of the single-writer event queue.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            reset_interval: default_reset_interval(),
            active_window: default_active_window(),
            default_limit: default_limit(),
            overview_limit: default_overview_limit(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

fn default_reset_interval() -> Duration {
    Duration::from_secs(60 * 60) // 60 minutes
}
fn default_active_window() -> Duration {
    Duration::from_secs(5 * 60) // 5 minutes
}
fn default_limit() -> usize {
    crate::core::analytics::report::DEFAULT_LIMIT
}
fn default_overview_limit() -> usize {
    5
}
fn default_event_queue_capacity() -> usize {
    16384
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the metrics HTTP server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

/// The on-disk shape of the configuration file. Every key is optional.
#[derive(Deserialize, Debug)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default)]
    analytics: AnalyticsConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5001
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}

/// Represents the final, validated server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_clients: usize,
    pub analytics: AnalyticsConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            analytics: AnalyticsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            log_level: raw_config.log_level,
            max_clients: raw_config.max_clients,
            analytics: raw_config.analytics,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }

        let analytics = &self.analytics;
        if analytics.reset_interval.is_zero() {
            return Err(anyhow!("analytics.reset_interval cannot be 0"));
        }
        if analytics.active_window.is_zero() {
            return Err(anyhow!("analytics.active_window cannot be 0"));
        }
        if analytics.default_limit == 0 {
            return Err(anyhow!("analytics.default_limit cannot be 0"));
        }
        if analytics.event_queue_capacity == 0 {
            return Err(anyhow!("analytics.event_queue_capacity cannot be 0"));
        }
        if analytics.active_window > analytics.reset_interval {
            warn!(
                "analytics.active_window is longer than analytics.reset_interval; active counts will be bounded by resets."
            );
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }
}
