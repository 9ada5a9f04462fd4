// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a visitor connection.

use super::guard::{ConnectionGuard, SlotReservation};
use super::message::{ClientMessage, ServerMessage};
use crate::core::analytics::session::ClientMetadata;
use crate::core::metrics;
use crate::core::PagePulseError;
use crate::core::state::ServerState;
use axum::extract::ws::{Message, WebSocket};
use axum::http::{HeaderMap, header};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Extracts the connection metadata from the upgrade request.
///
/// The first `X-Forwarded-For` entry wins over the peer address, since the
/// server normally sits behind a reverse proxy.
pub fn metadata_from_headers(headers: &HeaderMap, peer: SocketAddr) -> ClientMetadata {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let remote_addr = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string());

    ClientMetadata {
        remote_addr,
        user_agent: header_str(header::USER_AGENT.as_str()).unwrap_or_else(|| "unknown".into()),
        origin: header_str(header::ORIGIN.as_str()).unwrap_or_else(|| "unknown".into()),
        referrer: header_str(header::REFERER.as_str()),
    }
}

/// Manages the full lifecycle of a visitor connection.
pub struct ConnectionHandler {
    socket: WebSocket,
    id: String,
    meta: ClientMetadata,
    state: Arc<ServerState>,
    slot: SlotReservation,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    /// Creates a new `ConnectionHandler` with a fresh connection id. The
    /// reservation is held until the visitor is registered.
    pub fn new(
        socket: WebSocket,
        meta: ClientMetadata,
        state: Arc<ServerState>,
        slot: SlotReservation,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            id: Uuid::new_v4().to_string(),
            meta,
            state,
            slot,
            shutdown_rx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The main event loop for the connection, handling incoming frames,
    /// live-count notifications and shutdown.
    pub async fn run(self) -> Result<(), PagePulseError> {
        let Self {
            socket,
            id,
            meta,
            state,
            slot,
            mut shutdown_rx,
        } = self;
        let (mut sink, mut stream) = socket.split();

        let guard = ConnectionGuard::new(state.clone(), id.clone());
        // Subscribe first so the count change caused by our own connect is not missed.
        let mut count_rx = state.registry.subscribe();

        state.connect_visitor(&id, meta).await?;
        drop(slot);
        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();

        // Our own connect is also broadcast; only changes are pushed after the first send.
        let mut last_sent = state.registry.live_count();
        let mut open = send_count(&mut sink, last_sent).await;
        while open {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        state.registry.touch(&id);
                        handle_text(&state, &id, text.as_str()).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => open = false,
                    Some(Ok(_)) => state.registry.touch(&id),
                    Some(Err(e)) => {
                        debug!("Connection {} read error: {}", id, e);
                        open = false;
                    }
                },
                count = count_rx.recv() => {
                    let count = match count {
                        Ok(count) => count,
                        Err(RecvError::Lagged(_)) => state.registry.live_count(),
                        Err(RecvError::Closed) => break,
                    };
                    if count != last_sent {
                        last_sent = count;
                        open = send_count(&mut sink, count).await;
                    }
                },
                _ = shutdown_rx.recv() => {
                    debug!("Closing connection {} for server shutdown.", id);
                    let _ = sink.send(Message::Close(None)).await;
                    open = false;
                }
            }
        }

        guard.close().await;
        Ok(())
    }
}

/// Applies one navigation frame. Malformed frames are logged and skipped.
async fn handle_text(state: &ServerState, id: &str, text: &str) -> Result<(), PagePulseError> {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            metrics::INVALID_MESSAGES_TOTAL.inc();
            warn!("Ignoring malformed message from {}: {}", id, e);
            return Ok(());
        }
    };

    match message {
        ClientMessage::PageView { path, referrer } => {
            debug!("page-view {} {}", id, path);
            state.analytics.page_view(id, &path, &referrer).await
        }
        ClientMessage::PageExit { path } => {
            debug!("page-exit {} {}", id, path);
            state.analytics.page_exit(id, &path).await
        }
    }
}

/// Pushes the live count to the browser. Returns `false` if the socket is gone.
async fn send_count(sink: &mut SplitSink<WebSocket, Message>, count: usize) -> bool {
    let payload = match serde_json::to_string(&ServerMessage::VisitorCount { count }) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to encode visitor count: {}", e);
            return true;
        }
    };
    sink.send(Message::Text(payload.into())).await.is_ok()
}
