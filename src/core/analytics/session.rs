// src/core/analytics/session.rs

//! The Session Tracker: per-identity navigation history.
//!
//! Every page-view, page-exit and disconnect for an identity updates its
//! `ClientSession` and forwards the matching rollup to an `AggregateSink`.

use super::agent::{self, Browser, DeviceType};
use super::pages::AggregateSink;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// One occurrence of a session landing on a path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVisit {
    pub path: String,
    /// When the visit started.
    pub timestamp: DateTime<Utc>,
    /// Seconds spent on the page. `None` while the visit is still open.
    pub duration: Option<f64>,
    pub referrer: String,
}

impl PageVisit {
    fn open(path: &str, referrer: &str, now: DateTime<Utc>) -> Self {
        Self {
            path: path.to_string(),
            timestamp: now,
            duration: None,
            referrer: referrer.to_string(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.duration.is_none()
    }

    /// Closes the visit and returns its duration. A visit is closed at most
    /// once; later calls return `None` and leave the stored duration alone.
    fn close(&mut self, now: DateTime<Utc>) -> Option<f64> {
        if self.duration.is_some() {
            return None;
        }
        let duration = seconds_between(self.timestamp, now);
        self.duration = Some(duration);
        Some(duration)
    }
}

/// Connection metadata reported when a transport connection opens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMetadata {
    pub remote_addr: String,
    pub user_agent: String,
    pub origin: String,
    pub referrer: Option<String>,
}

/// The accumulated history and derived metrics for one identity since the last reset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub id: String,
    #[serde(rename = "ip")]
    pub remote_addr: String,
    pub user_agent: String,
    pub origin: String,
    pub referrer: String,
    pub connection_time: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub entry_page: Option<String>,
    pub exit_page: Option<String>,
    pub pages_visited: Vec<PageVisit>,
    /// Seconds from the first visit to the terminating event. `None` while open.
    pub session_duration: Option<f64>,
    pub browser: Browser,
    pub device_type: DeviceType,
    #[serde(skip)]
    seq: u64,
}

impl ClientSession {
    fn new(id: &str, now: DateTime<Utc>, seq: u64) -> Self {
        Self {
            id: id.to_string(),
            remote_addr: String::new(),
            user_agent: String::new(),
            origin: String::new(),
            referrer: String::new(),
            connection_time: now,
            last_active: now,
            entry_page: None,
            exit_page: None,
            pages_visited: Vec::new(),
            session_duration: None,
            browser: Browser::Unknown,
            device_type: DeviceType::Desktop,
            seq,
        }
    }

    /// Records `path` as the exit page and fixes the session duration if it
    /// has not been fixed by an earlier terminating event.
    fn mark_exit(&mut self, path: &str, now: DateTime<Utc>) {
        self.exit_page = Some(path.to_string());
        self.fix_session_duration(now);
    }

    fn fix_session_duration(&mut self, now: DateTime<Utc>) {
        if self.session_duration.is_some() {
            return;
        }
        if let Some(first) = self.pages_visited.first() {
            self.session_duration = Some(seconds_between(first.timestamp, now));
        }
    }
}

/// A session's visit list, as reported by the journeys view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorJourney {
    pub client_id: String,
    pub path: Vec<PageVisit>,
}

/// Owns every `ClientSession`, keyed by identity.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: HashMap<String, ClientSession>,
    next_seq: u64,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_mut(&mut self, identity: &str, now: DateTime<Utc>) -> &mut ClientSession {
        let next_seq = &mut self.next_seq;
        self.sessions
            .entry(identity.to_string())
            .or_insert_with(|| {
                let seq = *next_seq;
                *next_seq += 1;
                ClientSession::new(identity, now, seq)
            })
    }

    /// Stores connection metadata for `identity`, creating the session if needed.
    /// The referrer is only replaced by a non-empty value.
    pub fn record_client_info(&mut self, identity: &str, meta: ClientMetadata, now: DateTime<Utc>) {
        let session = self.session_mut(identity, now);
        let (browser, device_type) = agent::classify(&meta.user_agent);

        session.remote_addr = meta.remote_addr;
        session.user_agent = meta.user_agent;
        session.origin = meta.origin;
        if let Some(referrer) = meta.referrer.filter(|r| !r.is_empty()) {
            session.referrer = referrer;
        }
        session.browser = browser;
        session.device_type = device_type;
    }

    /// Appends a visit to `path`, closing the previous visit if it is still open.
    pub fn record_page_view<S: AggregateSink>(
        &mut self,
        identity: &str,
        path: &str,
        referrer: &str,
        now: DateTime<Utc>,
        sink: &mut S,
    ) {
        let session = self.session_mut(identity, now);
        let is_session_first_visit = session.pages_visited.is_empty();

        if is_session_first_visit {
            session.entry_page = Some(path.to_string());
        } else if let Some(previous) = session.pages_visited.last_mut() {
            previous.close(now);
        }

        let first_visit_to_path = !session.pages_visited.iter().any(|v| v.path == path);
        session.pages_visited.push(PageVisit::open(path, referrer, now));
        session.last_active = now;

        sink.on_page_view(path, first_visit_to_path, is_session_first_visit);
    }

    /// Closes the latest visit to `path` if it is still open.
    ///
    /// Returns `true` if a visit was closed. Unknown identities and paths with
    /// no open visit are ignored and never create a session.
    pub fn record_page_exit<S: AggregateSink>(
        &mut self,
        identity: &str,
        path: &str,
        now: DateTime<Utc>,
        sink: &mut S,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(identity) else {
            return false;
        };
        let Some(index) = session.pages_visited.iter().rposition(|v| v.path == path) else {
            return false;
        };
        let Some(duration) = session.pages_visited[index].close(now) else {
            return false;
        };

        if index + 1 == session.pages_visited.len() {
            session.mark_exit(path, now);
        }
        sink.on_page_exit(path, duration);
        true
    }

    /// Closes the session's last visit if it is still open and fixes the
    /// session duration. Unknown identities and empty sessions are ignored.
    ///
    /// Returns `true` if a visit was closed.
    pub fn record_disconnect<S: AggregateSink>(
        &mut self,
        identity: &str,
        now: DateTime<Utc>,
        sink: &mut S,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(identity) else {
            return false;
        };
        let Some(last) = session.pages_visited.last_mut() else {
            return false;
        };

        if let Some(duration) = last.close(now) {
            let path = last.path.clone();
            session.mark_exit(&path, now);
            sink.on_page_exit(&path, duration);
            true
        } else {
            session.fix_session_duration(now);
            false
        }
    }

    pub fn get(&self, identity: &str) -> Option<ClientSession> {
        self.sessions.get(identity).cloned()
    }

    /// Every session, in creation order.
    pub fn all_sessions(&self) -> Vec<ClientSession> {
        let mut sessions: Vec<&ClientSession> = self.sessions.values().collect();
        sessions.sort_by_key(|s| s.seq);
        sessions.into_iter().cloned().collect()
    }

    /// Sessions with at least one visit, in creation order.
    pub fn sessions_with_visits(&self) -> Vec<ClientSession> {
        self.visited_sessions().into_iter().cloned().collect()
    }

    /// The longest journeys first; equal lengths keep creation order.
    pub fn visitor_journeys(&self, limit: usize) -> Vec<VisitorJourney> {
        let mut sessions = self.visited_sessions();
        // Stable, so equal lengths stay in creation order.
        sessions.sort_by(|a, b| b.pages_visited.len().cmp(&a.pages_visited.len()));
        sessions
            .into_iter()
            .take(limit)
            .map(|s| VisitorJourney {
                client_id: s.id.clone(),
                path: s.pages_visited.clone(),
            })
            .collect()
    }

    fn visited_sessions(&self) -> Vec<&ClientSession> {
        let mut sessions: Vec<&ClientSession> = self
            .sessions
            .values()
            .filter(|s| !s.pages_visited.is_empty())
            .collect();
        sessions.sort_by_key(|s| s.seq);
        sessions
    }

    pub fn total_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Counts sessions whose last page-view happened less than `window` before `now`.
    pub fn active_session_count(&self, window: Duration, now: DateTime<Utc>) -> usize {
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        self.sessions
            .values()
            .filter(|s| now.signed_duration_since(s.last_active) < window)
            .count()
    }

    pub fn reset(&mut self) {
        self.sessions.clear();
        self.next_seq = 0;
    }
}

/// Elapsed seconds from `start` to `end`, floored at zero for out-of-order clocks.
fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = end.signed_duration_since(start).num_milliseconds().max(0);
    millis as f64 / 1000.0
}
