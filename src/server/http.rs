// src/server/http.rs

//! The public HTTP surface: the `/ws` visitor endpoint and the JSON reporting API.

use crate::connection::{ConnectionHandler, SlotReservation, metadata_from_headers};
use crate::core::PagePulseError;
use crate::core::analytics::report::clamp_limit;
use crate::core::state::ServerState;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub state: Arc<ServerState>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub max_clients: usize,
}

impl IntoResponse for PagePulseError {
    fn into_response(self) -> Response {
        let status = match &self {
            PagePulseError::InvalidRequest(_) | PagePulseError::InvalidMessage(_) => {
                StatusCode::BAD_REQUEST
            }
            PagePulseError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            PagePulseError::Io(_) | PagePulseError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the application router.
pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "OK" }))
        .route("/api/visitors", get(live_count))
        .route("/api/visitors/details", get(visitor_details))
        .route("/api/analytics", get(overview))
        .route("/api/analytics/pages", get(page_analytics))
        .route("/api/analytics/pages/popular", get(popular_pages))
        .route("/api/analytics/pages/entry", get(entry_pages))
        .route("/api/analytics/pages/exit", get(exit_pages))
        .route("/api/analytics/journeys", get(journeys))
        .route("/api/analytics/clients", get(client_details))
        .route("/api/analytics/reset", post(manual_reset))
        .route("/api/admin/log-level", put(set_log_level))
        .with_state(app)
}

/// The raw `limit` query parameter. Kept as a string so that an unparsable
/// value falls back to the default instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    limit: Option<String>,
}

impl LimitQuery {
    fn resolve(&self, default: usize) -> usize {
        let raw = self.limit.as_deref().and_then(|s| s.trim().parse::<i64>().ok());
        clamp_limit(raw, default)
    }
}

#[derive(Debug, Deserialize)]
struct LogLevelRequest {
    level: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(app): State<AppState>,
) -> Response {
    // Held until the visitor is registered; pending upgrades count against the cap.
    let Some(slot) = SlotReservation::acquire(app.state.clone(), app.max_clients) else {
        warn!(
            "Refusing connection from {}: max_clients ({}) reached.",
            peer, app.max_clients
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let meta = metadata_from_headers(&headers, peer);
    let shutdown_rx = app.shutdown_tx.subscribe();
    let state = app.state.clone();
    ws.on_upgrade(move |socket| async move {
        let handler = ConnectionHandler::new(socket, meta, state, slot, shutdown_rx);
        let id = handler.id().to_string();
        if let Err(e) = handler.run().await {
            warn!("Connection {} terminated unexpectedly: {}", id, e);
        }
        debug!("Connection {} handler finished.", id);
    })
}

async fn live_count(State(app): State<AppState>) -> impl IntoResponse {
    Json(json!({ "count": app.state.registry.live_count() }))
}

async fn visitor_details(State(app): State<AppState>) -> impl IntoResponse {
    let clients = app.state.registry.snapshot();
    Json(json!({ "count": clients.len(), "clients": clients }))
}

async fn overview(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.state.analytics.overview())
}

async fn page_analytics(State(app): State<AppState>) -> impl IntoResponse {
    Json(json!({ "pages": app.state.analytics.page_analytics() }))
}

async fn popular_pages(
    State(app): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> impl IntoResponse {
    let analytics = &app.state.analytics;
    let limit = q.resolve(analytics.config().default_limit);
    Json(json!({ "pages": analytics.popular_pages(limit) }))
}

async fn entry_pages(
    State(app): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> impl IntoResponse {
    let analytics = &app.state.analytics;
    let limit = q.resolve(analytics.config().default_limit);
    Json(json!({ "pages": analytics.top_entry_pages(limit) }))
}

async fn exit_pages(
    State(app): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> impl IntoResponse {
    let analytics = &app.state.analytics;
    let limit = q.resolve(analytics.config().default_limit);
    Json(json!({ "pages": analytics.top_exit_pages(limit) }))
}

async fn journeys(State(app): State<AppState>, Query(q): Query<LimitQuery>) -> impl IntoResponse {
    let analytics = &app.state.analytics;
    let limit = q.resolve(analytics.config().default_limit);
    Json(json!({ "journeys": analytics.visitor_journeys(limit) }))
}

async fn client_details(State(app): State<AppState>) -> impl IntoResponse {
    Json(json!({ "clients": app.state.analytics.client_details() }))
}

async fn manual_reset(State(app): State<AppState>) -> Result<impl IntoResponse, PagePulseError> {
    let reset_time = app.state.analytics.manual_reset().await?;
    Ok(Json(json!({
        "success": true,
        "message": "Analytics data has been reset",
        "resetTime": reset_time,
    })))
}

async fn set_log_level(
    State(app): State<AppState>,
    Json(body): Json<LogLevelRequest>,
) -> Result<impl IntoResponse, PagePulseError> {
    app.state.set_log_level(&body.level).await?;
    Ok(Json(json!({ "success": true, "level": body.level })))
}
