// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    // --- Server-wide Gauges ---
    /// The number of visitors currently holding a live connection.
    pub static ref LIVE_VISITORS: Gauge =
        register_gauge!("pagepulse_live_visitors", "Number of currently connected visitors.").unwrap();
    /// The number of analytics events waiting for the writer task.
    pub static ref EVENT_QUEUE_DEPTH: Gauge =
        register_gauge!("pagepulse_event_queue_depth", "Number of analytics events waiting to be applied.").unwrap();


    // --- Server-wide Counters ---
    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("pagepulse_connections_received_total", "Total number of visitor connections received.").unwrap();
    /// The total number of page-views applied by the writer.
    pub static ref PAGE_VIEWS_TOTAL: Counter =
        register_counter!("pagepulse_page_views_total", "Total number of page views recorded.").unwrap();
    /// The total number of visits closed by a page exit or a disconnect.
    pub static ref PAGE_EXITS_TOTAL: Counter =
        register_counter!("pagepulse_page_exits_total", "Total number of page visits closed by an exit or disconnect.").unwrap();
    /// The total number of analytics resets, scheduled or manual.
    pub static ref RESETS_TOTAL: Counter =
        register_counter!("pagepulse_resets_total", "Total number of analytics resets.").unwrap();
    /// The total number of client frames that could not be parsed.
    pub static ref INVALID_MESSAGES_TOTAL: Counter =
        register_counter!("pagepulse_invalid_messages_total", "Total number of malformed client messages ignored.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}
