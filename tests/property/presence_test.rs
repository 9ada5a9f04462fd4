// tests/property/presence_test.rs

//! Property-based tests for the live visitor count.

use pagepulse::core::state::ConnectionRegistry;
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum PresenceOp {
    Connect(u8),
    Disconnect(u8),
}

fn presence_op() -> impl Strategy<Value = PresenceOp> {
    prop_oneof![
        (0u8..8).prop_map(PresenceOp::Connect),
        (0u8..8).prop_map(PresenceOp::Disconnect),
    ]
}

proptest! {
    #[test]
    fn test_live_count_matches_registered_set(ops in prop::collection::vec(presence_op(), 0..200)) {
        let registry = ConnectionRegistry::new();
        let mut model = HashSet::new();

        for op in ops {
            match op {
                PresenceOp::Connect(id) => {
                    let inserted = registry.connect(&id.to_string(), "10.0.0.1", "ua", "origin");
                    prop_assert_eq!(inserted, model.insert(id));
                }
                PresenceOp::Disconnect(id) => {
                    let removed = registry.disconnect(&id.to_string());
                    prop_assert_eq!(removed, model.remove(&id));
                }
            }
            prop_assert_eq!(registry.live_count(), model.len());
        }
        prop_assert_eq!(registry.snapshot().len(), model.len());
    }
}
