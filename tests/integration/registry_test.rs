// tests/integration/registry_test.rs

//! Integration tests for the connection registry and the live count.

use pagepulse::core::state::ConnectionRegistry;
use std::sync::Arc;

#[tokio::test]
async fn test_connect_and_disconnect_move_live_count() {
    let registry = ConnectionRegistry::new();
    assert_eq!(registry.live_count(), 0);

    assert!(registry.connect("a", "10.0.0.1", "ua", "origin"));
    assert!(registry.connect("b", "10.0.0.2", "ua", "origin"));
    assert_eq!(registry.live_count(), 2);
    assert!(registry.contains("a"));

    assert!(registry.disconnect("a"));
    assert_eq!(registry.live_count(), 1);
    assert!(!registry.contains("a"));
}

#[tokio::test]
async fn test_duplicate_connect_is_ignored() {
    let registry = ConnectionRegistry::new();
    assert!(registry.connect("a", "10.0.0.1", "ua", "origin"));
    assert!(!registry.connect("a", "10.0.0.9", "other", "other"));
    assert_eq!(registry.live_count(), 1);

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].remote_addr, "10.0.0.1");
}

#[tokio::test]
async fn test_unknown_disconnect_never_goes_negative() {
    let registry = ConnectionRegistry::new();
    assert!(!registry.disconnect("ghost"));
    assert_eq!(registry.live_count(), 0);

    registry.connect("a", "10.0.0.1", "ua", "origin");
    assert!(registry.disconnect("a"));
    assert!(!registry.disconnect("a"));
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test]
async fn test_subscribers_receive_every_count_change() {
    let registry = ConnectionRegistry::new();
    let mut rx = registry.subscribe();

    registry.connect("a", "10.0.0.1", "ua", "origin");
    registry.connect("b", "10.0.0.1", "ua", "origin");
    registry.disconnect("a");
    // No-ops do not notify.
    registry.disconnect("a");
    registry.connect("b", "10.0.0.1", "ua", "origin");

    assert_eq!(rx.recv().await.unwrap(), 1);
    assert_eq!(rx.recv().await.unwrap(), 2);
    assert_eq!(rx.recv().await.unwrap(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_touch_refreshes_last_active_only() {
    let registry = ConnectionRegistry::new();
    registry.connect("a", "10.0.0.1", "ua", "origin");
    let before = registry.snapshot()[0].clone();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    registry.touch("a");
    registry.touch("unknown");

    let after = registry.snapshot()[0].clone();
    assert_eq!(after.connection_time, before.connection_time);
    assert!(after.last_active > before.last_active);
    assert_eq!(registry.live_count(), 1);
}

#[tokio::test]
async fn test_snapshot_is_ordered_oldest_first() {
    let registry = ConnectionRegistry::new();
    registry.connect("first", "10.0.0.1", "ua", "origin");
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    registry.connect("second", "10.0.0.2", "ua", "origin");

    let ids: Vec<String> = registry.snapshot().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["first".to_string(), "second".to_string()]);
}

#[tokio::test]
async fn test_concurrent_connect_disconnect_keeps_count_consistent() {
    let registry = Arc::new(ConnectionRegistry::new());
    let mut tasks = Vec::new();

    for worker in 0..8 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..200 {
                let id = format!("{worker}-{i}");
                registry.connect(&id, "10.0.0.1", "ua", "origin");
                // Racing duplicate signals for the same id.
                registry.connect(&id, "10.0.0.1", "ua", "origin");
                if i % 2 == 0 {
                    registry.disconnect(&id);
                    registry.disconnect(&id);
                }
            }
        }));
    }
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    assert_eq!(registry.live_count(), 8 * 100);
    assert_eq!(registry.snapshot().len(), 8 * 100);
}

#[test]
fn test_last_notification_matches_live_count_under_contention() {
    let registry = Arc::new(ConnectionRegistry::new());

    for round in 0..300 {
        let mut rx = registry.subscribe();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    for i in 0..4 {
                        let id = format!("{round}-{t}-{i}");
                        registry.connect(&id, "10.0.0.1", "ua", "origin");
                        if i % 2 == 1 {
                            registry.disconnect(&id);
                        }
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let mut last = None;
        let mut previous_in_order = true;
        while let Ok(count) = rx.try_recv() {
            if let Some(prev) = last {
                // Every change is exactly one connect or one disconnect.
                previous_in_order &= count == prev + 1 || count + 1 == prev;
            }
            last = Some(count);
        }
        assert!(previous_in_order, "round {round}: notifications out of order");
        assert_eq!(last, Some(registry.live_count()), "round {round}");
    }
    assert_eq!(registry.live_count(), 300 * 8 * 2);
}

#[test]
fn test_reservations_cap_pending_and_live_connections() {
    let registry = ConnectionRegistry::new();

    assert!(registry.try_reserve(2));
    assert!(registry.try_reserve(2));
    assert!(!registry.try_reserve(2));
    assert_eq!(registry.reserved_count(), 2);

    // Registering then releasing turns a reservation into a live slot.
    registry.connect("a", "10.0.0.1", "ua", "origin");
    registry.release_reservation();
    assert_eq!(registry.live_count(), 1);
    assert!(!registry.try_reserve(2));

    registry.release_reservation();
    assert!(registry.try_reserve(2));
    registry.release_reservation();
    registry.release_reservation();
    assert_eq!(registry.reserved_count(), 0);

    registry.disconnect("a");
    assert!(registry.try_reserve(1));
}
