// tests/property/ranking_test.rs

//! Property-based tests for page rankings and resets.

use crate::test_helpers::TestContext;
use pagepulse::core::analytics::pages::{AggregateSink, PageAggregateStore, RankBy};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_rankings_are_bounded_sorted_and_stable(
        views in prop::collection::vec(0u8..12, 1..150),
        limit in 0usize..15
    ) {
        let mut store = PageAggregateStore::new();
        let mut first_seen: Vec<String> = Vec::new();
        for p in &views {
            let path = format!("/p{p}");
            if !first_seen.contains(&path) {
                first_seen.push(path.clone());
            }
            store.on_page_view(&path, true, false);
        }

        let ranked = store.top_by(RankBy::Views, limit);
        prop_assert!(ranked.len() <= limit);
        prop_assert_eq!(ranked.len(), limit.min(first_seen.len()));

        for pair in ranked.windows(2) {
            prop_assert!(pair[0].views >= pair[1].views);
            if pair[0].views == pair[1].views {
                let a = first_seen.iter().position(|p| *p == pair[0].path);
                let b = first_seen.iter().position(|p| *p == pair[1].path);
                prop_assert!(a < b);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 20,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_reset_always_leaves_empty_state(
        events in prop::collection::vec((0u8..6, 0u8..6), 0..60)
    ) {
        tokio_test::block_on(async {
            let ctx = TestContext::new().await;
            let before = ctx.analytics().last_reset_time();
            for (v, p) in &events {
                ctx.analytics()
                    .page_view(&format!("v{v}"), &format!("/p{p}"), "")
                    .await
                    .unwrap();
            }

            let reset_at = ctx.analytics().reset().await.unwrap();

            assert!(reset_at >= before);
            assert_eq!(ctx.analytics().last_reset_time(), reset_at);
            assert_eq!(ctx.analytics().total_visitors(), 0);
            assert_eq!(ctx.analytics().active_visitors(), 0);
            assert!(ctx.analytics().page_analytics().is_empty());
            assert!(ctx.analytics().popular_pages(10).is_empty());
            assert!(ctx.analytics().top_entry_pages(10).is_empty());
            assert!(ctx.analytics().top_exit_pages(10).is_empty());
            assert!(ctx.analytics().visitor_journeys(10).is_empty());
            ctx.shutdown().await;
        });
    }
}
