// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::state::ServerState;
use std::sync::Arc;
use tracing::{debug, warn};

/// An RAII guard that guarantees a registered connection is disconnected when
/// its handler exits, including on early return, error or task abort.
pub struct ConnectionGuard {
    /// A shared reference to the server state.
    pub(crate) state: Arc<ServerState>,
    /// The connection id the visitor was registered under.
    pub(crate) id: String,
    /// Set once the disconnect has been delivered through `close`.
    pub(crate) is_closed: bool,
}

impl ConnectionGuard {
    /// Creates a new `ConnectionGuard`.
    pub(crate) fn new(state: Arc<ServerState>, id: String) -> Self {
        Self {
            state,
            id,
            is_closed: false,
        }
    }

    /// Delivers the disconnect and waits until it is queued for the writer.
    pub(crate) async fn close(mut self) {
        self.is_closed = true;
        if let Err(e) = self.state.disconnect_visitor(&self.id).await {
            warn!("Failed to record disconnect for {}: {}", self.id, e);
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.is_closed {
            return;
        }
        debug!(
            "ConnectionGuard dropping without a clean close, cleaning up connection {}",
            self.id
        );
        self.state.disconnect_visitor_nowait(&self.id);
    }
}

/// A connection slot held between the `max_clients` check and registration.
///
/// The slot is returned when the reservation is dropped, whether the visitor
/// registered or the upgrade never completed.
pub struct SlotReservation {
    state: Arc<ServerState>,
}

impl SlotReservation {
    /// Reserves a slot, or returns `None` if `max` connections are live or pending.
    pub fn acquire(state: Arc<ServerState>, max: usize) -> Option<Self> {
        state
            .registry
            .try_reserve(max)
            .then(|| Self { state })
    }
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        self.state.registry.release_reservation();
    }
}
