// src/core/events.rs

//! Defines the event bus that serializes every analytics mutation through a
//! single writer task.

use crate::core::analytics::session::ClientMetadata;
use crate::core::errors::PagePulseError;
use chrono::{DateTime, Utc};
use tokio::sync::{
    mpsc::{self, Sender as MpscSender, error::TrySendError},
    oneshot,
};
use tracing::{debug, warn};

/// A single mutation (or barrier) for the analytics writer.
///
/// Every event carries the time it was observed at the boundary, so durations
/// do not depend on how long the event waited in the queue.
#[derive(Debug)]
pub enum AnalyticsEvent {
    ClientInfo {
        identity: String,
        meta: ClientMetadata,
        at: DateTime<Utc>,
    },
    PageView {
        identity: String,
        path: String,
        referrer: String,
        at: DateTime<Utc>,
    },
    PageExit {
        identity: String,
        path: String,
        at: DateTime<Utc>,
    },
    Disconnect {
        identity: String,
        at: DateTime<Utc>,
    },
    /// Clears all sessions and aggregates. The reply carries the new reset time.
    Reset {
        at: DateTime<Utc>,
        reply: Option<oneshot::Sender<DateTime<Utc>>>,
    },
    /// Acknowledged once every event queued before it has been applied.
    Flush { reply: oneshot::Sender<()> },
}

impl AnalyticsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::ClientInfo { .. } => "client-info",
            AnalyticsEvent::PageView { .. } => "page-view",
            AnalyticsEvent::PageExit { .. } => "page-exit",
            AnalyticsEvent::Disconnect { .. } => "disconnect",
            AnalyticsEvent::Reset { .. } => "reset",
            AnalyticsEvent::Flush { .. } => "flush",
        }
    }
}

/// The producer side of the analytics queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: MpscSender<AnalyticsEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` and returns the receiver for the writer task.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AnalyticsEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queues an event, waiting for room if the writer is behind.
    pub async fn publish(&self, event: AnalyticsEvent) -> Result<(), PagePulseError> {
        self.sender.send(event).await?;
        Ok(())
    }

    /// Queues an event from a synchronous context, such as a `Drop` impl.
    ///
    /// If the queue is full the send is moved onto a spawned task, so the event
    /// is delayed rather than lost. Outside a Tokio runtime it is dropped.
    pub fn publish_nowait(&self, event: AnalyticsEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let name = event.name();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        debug!("Analytics queue is full; deferring '{}' event.", name);
                        let sender = self.sender.clone();
                        handle.spawn(async move {
                            if sender.send(event).await.is_err() {
                                debug!("Analytics queue closed before a deferred event was sent.");
                            }
                        });
                    }
                    Err(_) => warn!(
                        "Analytics queue is full and no runtime is available; dropping '{}' event.",
                        name
                    ),
                }
            }
            Err(TrySendError::Closed(event)) => {
                debug!(
                    "Analytics queue is closed; dropping '{}' event.",
                    event.name()
                );
            }
        }
    }
}
