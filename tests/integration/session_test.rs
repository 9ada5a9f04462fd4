// tests/integration/session_test.rs

//! Integration tests for the session tracker, driven with fixed timestamps.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use pagepulse::core::analytics::agent::{Browser, DeviceType};
use pagepulse::core::analytics::pages::{AggregateSink, PageAggregateStore};
use pagepulse::core::analytics::session::{ClientMetadata, SessionTracker};
use std::time::Duration;

/// Records every notification the tracker emits.
#[derive(Default)]
struct RecordingSink {
    views: Vec<(String, bool, bool)>,
    exits: Vec<(String, f64)>,
}

impl AggregateSink for RecordingSink {
    fn on_page_view(&mut self, path: &str, first_visit_to_path: bool, is_entry_page: bool) {
        self.views
            .push((path.to_string(), first_visit_to_path, is_entry_page));
    }

    fn on_page_exit(&mut self, path: &str, duration_secs: f64) {
        self.exits.push((path.to_string(), duration_secs));
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + TimeDelta::seconds(secs)
}

#[test]
fn test_first_page_view_sets_entry_page() {
    let mut tracker = SessionTracker::new();
    let mut sink = RecordingSink::default();

    tracker.record_page_view("a", "/home", "https://google.com", at(0), &mut sink);
    tracker.record_page_view("a", "/about", "", at(3), &mut sink);
    tracker.record_page_view("a", "/home", "", at(5), &mut sink);

    let session = tracker.get("a").unwrap();
    assert_eq!(session.entry_page.as_deref(), Some("/home"));
    assert_eq!(session.pages_visited.len(), 3);
    assert_eq!(session.pages_visited[0].referrer, "https://google.com");
    assert_eq!(
        sink.views,
        vec![
            ("/home".to_string(), true, true),
            ("/about".to_string(), true, false),
            ("/home".to_string(), false, false),
        ]
    );
}

#[test]
fn test_new_page_view_closes_previous_visit_without_rollup() {
    let mut tracker = SessionTracker::new();
    let mut sink = RecordingSink::default();

    tracker.record_page_view("a", "/home", "", at(0), &mut sink);
    tracker.record_page_view("a", "/about", "", at(4), &mut sink);

    let session = tracker.get("a").unwrap();
    assert_eq!(session.pages_visited[0].duration, Some(4.0));
    assert!(session.pages_visited[1].is_open());
    // Navigation closes the visit but does not count as an exit.
    assert!(sink.exits.is_empty());
    assert_eq!(session.exit_page, None);
}

#[test]
fn test_page_exit_closes_latest_open_visit_once() {
    let mut tracker = SessionTracker::new();
    let mut sink = RecordingSink::default();

    tracker.record_page_view("a", "/home", "", at(0), &mut sink);
    assert!(tracker.record_page_exit("a", "/home", at(7), &mut sink));
    assert!(!tracker.record_page_exit("a", "/home", at(9), &mut sink));

    let session = tracker.get("a").unwrap();
    assert_eq!(session.pages_visited[0].duration, Some(7.0));
    assert_eq!(session.exit_page.as_deref(), Some("/home"));
    assert_eq!(session.session_duration, Some(7.0));
    assert_eq!(sink.exits, vec![("/home".to_string(), 7.0)]);
}

#[test]
fn test_page_exit_for_unknown_identity_creates_nothing() {
    let mut tracker = SessionTracker::new();
    let mut sink = RecordingSink::default();

    assert!(!tracker.record_page_exit("b", "/missing", at(0), &mut sink));
    assert_eq!(tracker.total_session_count(), 0);
    assert!(tracker.get("b").is_none());
    assert!(sink.exits.is_empty());
}

#[test]
fn test_page_exit_for_unvisited_path_is_ignored() {
    let mut tracker = SessionTracker::new();
    let mut sink = RecordingSink::default();

    tracker.record_page_view("a", "/home", "", at(0), &mut sink);
    assert!(!tracker.record_page_exit("a", "/pricing", at(2), &mut sink));
    assert!(tracker.get("a").unwrap().pages_visited[0].is_open());
}

#[test]
fn test_disconnect_closes_last_visit_and_fixes_duration() {
    let mut tracker = SessionTracker::new();
    let mut sink = RecordingSink::default();

    tracker.record_page_view("a", "/home", "", at(0), &mut sink);
    tracker.record_page_view("a", "/about", "", at(10), &mut sink);
    assert!(tracker.record_disconnect("a", at(25), &mut sink));

    let session = tracker.get("a").unwrap();
    assert_eq!(session.pages_visited[1].duration, Some(15.0));
    assert_eq!(session.exit_page.as_deref(), Some("/about"));
    assert_eq!(session.session_duration, Some(25.0));
    assert_eq!(sink.exits, vec![("/about".to_string(), 15.0)]);
}

#[test]
fn test_disconnect_after_exit_keeps_first_session_duration() {
    let mut tracker = SessionTracker::new();
    let mut sink = RecordingSink::default();

    tracker.record_page_view("a", "/home", "", at(0), &mut sink);
    tracker.record_page_exit("a", "/home", at(5), &mut sink);
    assert!(!tracker.record_disconnect("a", at(30), &mut sink));

    let session = tracker.get("a").unwrap();
    assert_eq!(session.session_duration, Some(5.0));
    assert_eq!(session.pages_visited[0].duration, Some(5.0));
    assert_eq!(sink.exits.len(), 1);
}

#[test]
fn test_disconnect_without_visits_is_noop() {
    let mut tracker = SessionTracker::new();
    let mut sink = RecordingSink::default();

    tracker.record_client_info("a", ClientMetadata::default(), at(0));
    assert!(!tracker.record_disconnect("a", at(3), &mut sink));
    assert!(!tracker.record_disconnect("ghost", at(3), &mut sink));

    let session = tracker.get("a").unwrap();
    assert_eq!(session.session_duration, None);
    assert_eq!(session.exit_page, None);
    assert_eq!(tracker.total_session_count(), 1);
}

#[test]
fn test_client_info_classifies_and_keeps_referrer() {
    let mut tracker = SessionTracker::new();
    let meta = ClientMetadata {
        remote_addr: "203.0.113.5".to_string(),
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1".to_string(),
        origin: "https://example.com".to_string(),
        referrer: Some("https://news.example.org".to_string()),
    };
    tracker.record_client_info("a", meta.clone(), at(0));
    tracker.record_client_info(
        "a",
        ClientMetadata {
            referrer: Some(String::new()),
            ..meta
        },
        at(1),
    );

    let session = tracker.get("a").unwrap();
    assert_eq!(session.remote_addr, "203.0.113.5");
    assert_eq!(session.referrer, "https://news.example.org");
    assert_eq!(session.browser, Browser::Safari);
    assert_eq!(session.device_type, DeviceType::Mobile);
    assert_eq!(session.connection_time, at(0));
}

#[test]
fn test_active_session_count_uses_last_page_view() {
    let mut tracker = SessionTracker::new();
    let mut sink = PageAggregateStore::new();
    let window = Duration::from_secs(5 * 60);

    tracker.record_page_view("old", "/home", "", at(0), &mut sink);
    tracker.record_page_view("fresh", "/home", "", at(400), &mut sink);

    assert_eq!(tracker.active_session_count(window, at(420)), 1);
    assert_eq!(tracker.active_session_count(window, at(200)), 2);
    assert_eq!(tracker.active_session_count(window, at(1000)), 0);
    assert_eq!(tracker.total_session_count(), 2);
}

#[test]
fn test_visitor_journeys_longest_first_with_creation_tiebreak() {
    let mut tracker = SessionTracker::new();
    let mut sink = PageAggregateStore::new();

    tracker.record_page_view("short", "/a", "", at(0), &mut sink);
    tracker.record_page_view("tie-1", "/a", "", at(1), &mut sink);
    tracker.record_page_view("tie-1", "/b", "", at(2), &mut sink);
    tracker.record_page_view("tie-2", "/a", "", at(3), &mut sink);
    tracker.record_page_view("tie-2", "/c", "", at(4), &mut sink);
    tracker.record_page_view("long", "/a", "", at(5), &mut sink);
    tracker.record_page_view("long", "/b", "", at(6), &mut sink);
    tracker.record_page_view("long", "/c", "", at(7), &mut sink);
    tracker.record_client_info("empty", ClientMetadata::default(), at(8));

    let ids: Vec<String> = tracker
        .visitor_journeys(10)
        .into_iter()
        .map(|j| j.client_id)
        .collect();
    assert_eq!(ids, vec!["long", "tie-1", "tie-2", "short"]);
    assert_eq!(tracker.visitor_journeys(2).len(), 2);
    assert!(tracker.visitor_journeys(0).is_empty());
    assert_eq!(tracker.sessions_with_visits().len(), 4);
    assert_eq!(tracker.all_sessions().len(), 5);
}

#[test]
fn test_out_of_order_clock_floors_duration_at_zero() {
    let mut tracker = SessionTracker::new();
    let mut sink = RecordingSink::default();

    tracker.record_page_view("a", "/home", "", at(10), &mut sink);
    tracker.record_page_exit("a", "/home", at(5), &mut sink);

    assert_eq!(tracker.get("a").unwrap().pages_visited[0].duration, Some(0.0));
}

#[test]
fn test_reset_clears_sessions() {
    let mut tracker = SessionTracker::new();
    let mut sink = RecordingSink::default();
    tracker.record_page_view("a", "/home", "", at(0), &mut sink);

    tracker.reset();
    assert_eq!(tracker.total_session_count(), 0);
    assert!(tracker.visitor_journeys(10).is_empty());
}

#[test]
fn test_journeys_cover_exactly_the_sessions_with_visits() {
    let mut tracker = SessionTracker::new();
    let mut sink = PageAggregateStore::new();

    tracker.record_client_info("idle", ClientMetadata::default(), at(0));
    tracker.record_page_view("a", "/home", "", at(1), &mut sink);
    tracker.record_page_view("b", "/home", "", at(2), &mut sink);
    tracker.record_page_view("b", "/docs", "", at(3), &mut sink);

    let mut journey_ids: Vec<String> = tracker
        .visitor_journeys(usize::MAX)
        .into_iter()
        .map(|j| j.client_id)
        .collect();
    journey_ids.sort();
    let visited_ids: Vec<String> = tracker
        .sessions_with_visits()
        .into_iter()
        .map(|s| s.id)
        .collect();

    assert_eq!(visited_ids, vec!["a", "b"]);
    assert_eq!(journey_ids, visited_ids);
}
