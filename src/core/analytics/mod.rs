// src/core/analytics/mod.rs

//! The aggregation engine: the composition root that owns the session tracker
//! and the page aggregate store.
//!
//! All mutations travel through a single `EventBus` and are applied by one
//! `AnalyticsWorker` task under a write lock. Readers take the read lock, so a
//! reset is always observed as a whole.

pub mod agent;
pub mod pages;
pub mod report;
pub mod session;

use crate::config::AnalyticsConfig;
use crate::core::errors::PagePulseError;
use crate::core::events::{AnalyticsEvent, EventBus};
use crate::core::metrics;
use chrono::{DateTime, Utc};
use pages::{PageAggregate, PageAggregateStore, RankBy};
use parking_lot::RwLock;
use report::AnalyticsOverview;
use session::{ClientMetadata, ClientSession, SessionTracker, VisitorJourney};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

/// The state owned by the writer: both maps plus the time of the last reset.
#[derive(Debug)]
pub struct AnalyticsState {
    pub sessions: SessionTracker,
    pub pages: PageAggregateStore,
    pub last_reset: DateTime<Utc>,
}

impl AnalyticsState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            sessions: SessionTracker::new(),
            pages: PageAggregateStore::new(),
            last_reset: now,
        }
    }

    /// Applies one event. This is the only place either map is mutated.
    pub fn apply(&mut self, event: AnalyticsEvent) {
        match event {
            AnalyticsEvent::ClientInfo { identity, meta, at } => {
                self.sessions.record_client_info(&identity, meta, at);
            }
            AnalyticsEvent::PageView {
                identity,
                path,
                referrer,
                at,
            } => {
                self.sessions
                    .record_page_view(&identity, &path, &referrer, at, &mut self.pages);
                metrics::PAGE_VIEWS_TOTAL.inc();
            }
            AnalyticsEvent::PageExit { identity, path, at } => {
                if self
                    .sessions
                    .record_page_exit(&identity, &path, at, &mut self.pages)
                {
                    metrics::PAGE_EXITS_TOTAL.inc();
                } else {
                    debug!(
                        "Ignoring page exit for '{}' on '{}': no open visit.",
                        identity, path
                    );
                }
            }
            AnalyticsEvent::Disconnect { identity, at } => {
                if self
                    .sessions
                    .record_disconnect(&identity, at, &mut self.pages)
                {
                    metrics::PAGE_EXITS_TOTAL.inc();
                }
            }
            AnalyticsEvent::Reset { at, reply } => {
                self.reset(at);
                if let Some(reply) = reply {
                    let _ = reply.send(at);
                }
            }
            AnalyticsEvent::Flush { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn reset(&mut self, at: DateTime<Utc>) {
        let sessions = self.sessions.total_session_count();
        let pages = self.pages.len();
        self.sessions.reset();
        self.pages.reset();
        self.last_reset = at;
        metrics::RESETS_TOTAL.inc();
        info!(
            "Analytics reset at {}: cleared {} sessions and {} page aggregates.",
            at.to_rfc3339(),
            sessions,
            pages
        );
    }
}

/// A cheap, cloneable handle to the engine. Mutations are queued for the
/// writer; reads are served directly from the shared state.
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    bus: EventBus,
    state: Arc<RwLock<AnalyticsState>>,
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    /// Creates the engine handle and the writer task that must be spawned to drive it.
    pub fn new(config: AnalyticsConfig) -> (Self, AnalyticsWorker) {
        let (bus, rx) = EventBus::new(config.event_queue_capacity);
        let state = Arc::new(RwLock::new(AnalyticsState::new(Utc::now())));
        let worker = AnalyticsWorker {
            state: state.clone(),
            rx,
        };
        (Self { bus, state, config }, worker)
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    // --- Mutations ---

    /// Stores connection metadata for `identity`.
    pub async fn record_client_info(
        &self,
        identity: &str,
        meta: ClientMetadata,
    ) -> Result<(), PagePulseError> {
        self.bus
            .publish(AnalyticsEvent::ClientInfo {
                identity: identity.to_string(),
                meta,
                at: Utc::now(),
            })
            .await
    }

    pub async fn page_view(
        &self,
        identity: &str,
        path: &str,
        referrer: &str,
    ) -> Result<(), PagePulseError> {
        self.bus
            .publish(AnalyticsEvent::PageView {
                identity: identity.to_string(),
                path: path.to_string(),
                referrer: referrer.to_string(),
                at: Utc::now(),
            })
            .await
    }

    pub async fn page_exit(&self, identity: &str, path: &str) -> Result<(), PagePulseError> {
        self.bus
            .publish(AnalyticsEvent::PageExit {
                identity: identity.to_string(),
                path: path.to_string(),
                at: Utc::now(),
            })
            .await
    }

    pub async fn disconnect(&self, identity: &str) -> Result<(), PagePulseError> {
        self.bus
            .publish(AnalyticsEvent::Disconnect {
                identity: identity.to_string(),
                at: Utc::now(),
            })
            .await
    }

    /// Queues a disconnect without awaiting. Used from `Drop`.
    pub fn disconnect_nowait(&self, identity: &str) {
        self.bus.publish_nowait(AnalyticsEvent::Disconnect {
            identity: identity.to_string(),
            at: Utc::now(),
        });
    }

    /// Clears all sessions and aggregates and returns the new reset time.
    /// Every event queued before the reset is applied first.
    pub async fn reset(&self) -> Result<DateTime<Utc>, PagePulseError> {
        let (reply, rx) = oneshot::channel();
        self.bus
            .publish(AnalyticsEvent::Reset {
                at: Utc::now(),
                reply: Some(reply),
            })
            .await?;
        Ok(rx.await?)
    }

    /// An operator-requested reset. Same guarantees as `reset`.
    pub async fn manual_reset(&self) -> Result<DateTime<Utc>, PagePulseError> {
        info!("Manual analytics reset requested.");
        self.reset().await
    }

    /// Resolves once every event queued before this call has been applied.
    pub async fn flush(&self) -> Result<(), PagePulseError> {
        let (reply, rx) = oneshot::channel();
        self.bus.publish(AnalyticsEvent::Flush { reply }).await?;
        Ok(rx.await?)
    }

    // --- Reads ---

    pub fn total_visitors(&self) -> usize {
        self.state.read().sessions.total_session_count()
    }

    /// Sessions with a page-view inside the configured activity window.
    pub fn active_visitors(&self) -> usize {
        self.active_visitors_within(self.config.active_window)
    }

    pub fn active_visitors_within(&self, window: Duration) -> usize {
        self.state
            .read()
            .sessions
            .active_session_count(window, Utc::now())
    }

    pub fn popular_pages(&self, limit: usize) -> Vec<PageAggregate> {
        self.state.read().pages.top_by(RankBy::Views, limit)
    }

    pub fn top_entry_pages(&self, limit: usize) -> Vec<PageAggregate> {
        self.state.read().pages.top_by(RankBy::EntryCount, limit)
    }

    pub fn top_exit_pages(&self, limit: usize) -> Vec<PageAggregate> {
        self.state.read().pages.top_by(RankBy::ExitCount, limit)
    }

    pub fn page_analytics(&self) -> Vec<PageAggregate> {
        self.state.read().pages.aggregates()
    }

    pub fn visitor_journeys(&self, limit: usize) -> Vec<VisitorJourney> {
        self.state.read().sessions.visitor_journeys(limit)
    }

    /// Every session with its connection metadata, for diagnostic listings.
    pub fn client_details(&self) -> Vec<ClientSession> {
        self.state.read().sessions.all_sessions()
    }

    pub fn session(&self, identity: &str) -> Option<ClientSession> {
        self.state.read().sessions.get(identity)
    }

    pub fn last_reset_time(&self) -> DateTime<Utc> {
        self.state.read().last_reset
    }

    /// Builds the dashboard summary from one consistent snapshot.
    pub fn overview(&self) -> AnalyticsOverview {
        let limit = self.config.overview_limit;
        let state = self.state.read();
        AnalyticsOverview {
            total_visitors: state.sessions.total_session_count(),
            active_visitors: state
                .sessions
                .active_session_count(self.config.active_window, Utc::now()),
            popular_pages: state.pages.top_by(RankBy::Views, limit),
            top_entry_pages: state.pages.top_by(RankBy::EntryCount, limit),
            top_exit_pages: state.pages.top_by(RankBy::ExitCount, limit),
            last_reset_time: state.last_reset,
            auto_reset_interval: self.config.reset_interval,
        }
    }
}

/// The single writer. Owns the receiving end of the event queue.
pub struct AnalyticsWorker {
    state: Arc<RwLock<AnalyticsState>>,
    rx: mpsc::Receiver<AnalyticsEvent>,
}

impl AnalyticsWorker {
    /// Runs the main loop for the writer. On shutdown, events that were already
    /// queued are applied before the task returns.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Analytics writer task started.");
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.apply(event),
                    None => {
                        info!("All analytics producers are gone. Writer task exiting.");
                        return;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Analytics writer task shutting down.");
                    self.rx.close();
                    let mut drained = 0usize;
                    while let Some(event) = self.rx.recv().await {
                        self.apply(event);
                        drained += 1;
                    }
                    if drained > 0 {
                        debug!("Applied {} queued analytics events on shutdown.", drained);
                    }
                    return;
                }
            }
        }
    }

    fn apply(&self, event: AnalyticsEvent) {
        self.state.write().apply(event);
        metrics::EVENT_QUEUE_DEPTH.set(self.rx.len() as f64);
    }
}
