// src/core/analytics/pages.rs

//! The Page Aggregate Store: per-path rollups derived from session events.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Receives the rollup notifications emitted by the session tracker.
///
/// `PageAggregateStore` is the production implementation; the seam exists so the
/// tracker can be driven and observed in isolation.
pub trait AggregateSink {
    /// A page-view was recorded for `path`.
    fn on_page_view(&mut self, path: &str, first_visit_to_path: bool, is_entry_page: bool);
    /// An open visit to `path` was closed by an exit or a disconnect.
    fn on_page_exit(&mut self, path: &str, duration_secs: f64);
}

/// Statistics for a single path since the last reset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAggregate {
    pub path: String,
    pub views: u64,
    pub unique_visitors: u64,
    /// Mean of all positive visit durations, in seconds. `None` until one is recorded.
    pub average_duration: Option<f64>,
    /// Number of sessions that started on this path.
    #[serde(rename = "isEntryPage")]
    pub entry_count: u64,
    /// Number of visits to this path that ended with an exit or disconnect.
    #[serde(rename = "isExitPage")]
    pub exit_count: u64,
    #[serde(skip)]
    duration_total: f64,
    #[serde(skip)]
    duration_samples: u64,
    /// First-seen order, used to break ranking ties.
    #[serde(skip)]
    seq: u64,
}

impl PageAggregate {
    fn new(path: &str, seq: u64) -> Self {
        Self {
            path: path.to_string(),
            views: 0,
            unique_visitors: 0,
            average_duration: None,
            entry_count: 0,
            exit_count: 0,
            duration_total: 0.0,
            duration_samples: 0,
            seq,
        }
    }

    /// The number of positive durations folded into `average_duration`.
    pub fn duration_samples(&self) -> u64 {
        self.duration_samples
    }

    fn record_duration(&mut self, duration_secs: f64) {
        // Same-instant enter/exit pairs would drag the mean toward zero.
        if duration_secs > 0.0 {
            self.duration_total += duration_secs;
            self.duration_samples += 1;
            self.average_duration = Some(self.duration_total / self.duration_samples as f64);
        }
    }
}

/// The numeric field a ranking is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBy {
    Views,
    EntryCount,
    ExitCount,
}

impl RankBy {
    fn key(self, page: &PageAggregate) -> u64 {
        match self {
            RankBy::Views => page.views,
            RankBy::EntryCount => page.entry_count,
            RankBy::ExitCount => page.exit_count,
        }
    }
}

/// Owns one `PageAggregate` per distinct path.
#[derive(Debug, Default)]
pub struct PageAggregateStore {
    pages: HashMap<String, PageAggregate>,
    next_seq: u64,
}

impl PageAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every aggregate, in first-seen order.
    pub fn aggregates(&self) -> Vec<PageAggregate> {
        let mut pages: Vec<&PageAggregate> = self.pages.values().collect();
        pages.sort_by_key(|p| p.seq);
        pages.into_iter().cloned().collect()
    }

    /// Returns the aggregate for a single path, if it has been viewed.
    pub fn get(&self, path: &str) -> Option<PageAggregate> {
        self.pages.get(path).cloned()
    }

    /// Returns at most `limit` aggregates sorted descending by `rank`.
    /// Equal values keep first-seen order.
    pub fn top_by(&self, rank: RankBy, limit: usize) -> Vec<PageAggregate> {
        let mut pages: Vec<&PageAggregate> = self.pages.values().collect();
        pages.sort_by(|a, b| {
            rank.key(b)
                .cmp(&rank.key(a))
                .then_with(|| a.seq.cmp(&b.seq))
        });
        pages.into_iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Drops every aggregate.
    pub fn reset(&mut self) {
        self.pages.clear();
        self.next_seq = 0;
    }
}

impl AggregateSink for PageAggregateStore {
    fn on_page_view(&mut self, path: &str, first_visit_to_path: bool, is_entry_page: bool) {
        let next_seq = &mut self.next_seq;
        let page = self.pages.entry(path.to_string()).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            PageAggregate::new(path, seq)
        });

        page.views += 1;
        if first_visit_to_path {
            page.unique_visitors += 1;
        }
        if is_entry_page {
            page.entry_count += 1;
        }
    }

    fn on_page_exit(&mut self, path: &str, duration_secs: f64) {
        match self.pages.get_mut(path) {
            Some(page) => {
                page.exit_count += 1;
                page.record_duration(duration_secs);
            }
            None => debug!("Ignoring exit for '{}', which has no recorded views.", path),
        }
    }
}
