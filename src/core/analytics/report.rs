// src/core/analytics/report.rs

//! Serializable report views assembled from a consistent engine snapshot.

use super::pages::PageAggregate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// The fallback page-list length when a caller supplies no usable limit.
pub const DEFAULT_LIMIT: usize = 10;

/// Resolves a caller-supplied list limit. Missing or negative values fall back
/// to `default`; zero is a legitimate request for an empty list.
pub fn clamp_limit(raw: Option<i64>, default: usize) -> usize {
    match raw {
        Some(n) if n >= 0 => usize::try_from(n).unwrap_or(usize::MAX),
        _ => default,
    }
}

/// The dashboard summary, built under a single read lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub total_visitors: usize,
    pub active_visitors: usize,
    pub popular_pages: Vec<PageAggregate>,
    pub top_entry_pages: Vec<PageAggregate>,
    pub top_exit_pages: Vec<PageAggregate>,
    pub last_reset_time: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub auto_reset_interval: Duration,
}
