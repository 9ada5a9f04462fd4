// src/core/state/client.rs

//! Contains state definitions related to live visitor connections.

use crate::core::metrics;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the live-count notification channel. Slow subscribers skip
/// stale counts, which is harmless since only the latest value matters.
const COUNT_CHANNEL_CAPACITY: usize = 64;

/// One live transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    #[serde(rename = "ip")]
    pub remote_addr: String,
    pub user_agent: String,
    pub origin: String,
    pub connection_time: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// The live count plus the slots held by upgrades that have not registered yet.
#[derive(Debug, Default)]
struct Occupancy {
    live: usize,
    reserved: usize,
}

/// Tracks which connections are alive and publishes the live count.
///
/// Every operation on an unknown id is a silent no-op, so duplicated or
/// reordered transport signals cannot corrupt the count. Count changes are
/// broadcast while the occupancy lock is held, so subscribers see them in order.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionRecord>,
    occupancy: Mutex<Occupancy>,
    count_tx: broadcast::Sender<usize>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        let (count_tx, _) = broadcast::channel(COUNT_CHANNEL_CAPACITY);
        Self {
            connections: DashMap::new(),
            occupancy: Mutex::new(Occupancy::default()),
            count_tx,
        }
    }

    /// Registers a connection. Returns `false` if `id` was already registered.
    pub fn connect(&self, id: &str, remote_addr: &str, user_agent: &str, origin: &str) -> bool {
        let now = Utc::now();
        match self.connections.entry(id.to_string()) {
            Entry::Occupied(_) => {
                debug!("Connection {} is already registered; ignoring.", id);
                false
            }
            Entry::Vacant(slot) => {
                // The count moves while the shard lock is held, so a racing
                // disconnect for the same id always decrements after this.
                let mut occupancy = self.occupancy.lock();
                slot.insert(ConnectionRecord {
                    id: id.to_string(),
                    remote_addr: remote_addr.to_string(),
                    user_agent: user_agent.to_string(),
                    origin: origin.to_string(),
                    connection_time: now,
                    last_active: now,
                });
                occupancy.live += 1;
                self.notify(occupancy.live);
                true
            }
        }
    }

    /// Refreshes the last-activity time of a registered connection.
    pub fn touch(&self, id: &str) {
        if let Some(mut record) = self.connections.get_mut(id) {
            record.last_active = Utc::now();
        }
    }

    /// Removes a connection. Returns `false` if `id` was not registered.
    pub fn disconnect(&self, id: &str) -> bool {
        if self.connections.remove(id).is_none() {
            debug!("Connection {} is not registered; ignoring disconnect.", id);
            return false;
        }
        let mut occupancy = self.occupancy.lock();
        occupancy.live = occupancy.live.saturating_sub(1);
        self.notify(occupancy.live);
        true
    }

    pub fn live_count(&self) -> usize {
        self.occupancy.lock().live
    }

    /// Holds a slot for a connection that is about to register. Fails once
    /// live connections plus outstanding reservations reach `max`.
    pub fn try_reserve(&self, max: usize) -> bool {
        let mut occupancy = self.occupancy.lock();
        if occupancy.live + occupancy.reserved >= max {
            return false;
        }
        occupancy.reserved += 1;
        true
    }

    /// Gives back a slot taken by `try_reserve`.
    pub fn release_reservation(&self) {
        let mut occupancy = self.occupancy.lock();
        occupancy.reserved = occupancy.reserved.saturating_sub(1);
    }

    pub fn reserved_count(&self) -> usize {
        self.occupancy.lock().reserved
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// A point-in-time copy of every live connection, oldest first.
    pub fn snapshot(&self) -> Vec<ConnectionRecord> {
        let mut records: Vec<ConnectionRecord> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| {
            a.connection_time
                .cmp(&b.connection_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    /// Subscribes to live-count changes.
    pub fn subscribe(&self) -> broadcast::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Must be called with the occupancy lock held.
    fn notify(&self, count: usize) {
        metrics::LIVE_VISITORS.set(count as f64);
        // No subscribers is a normal state.
        let _ = self.count_tx.send(count);
    }
}
