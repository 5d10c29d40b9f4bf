//! REST API and SSE routes

use crate::audio::QueueStatus;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use boxbox_core::{CarSnapshot, CompetitorState, SessionKind};
use futures::stream::{Stream, StreamExt as FuturesStreamExt};
use serde::Serialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/competitors", get(competitors))
        .route("/api/field", get(field))
        .route("/api/events/stream", get(event_stream))
        .route("/api/radio/mute", post(mute))
        .route("/api/radio/unmute", post(unmute))
        .route("/api/radio/connect", post(connect))
        .route("/api/radio/disconnect", post(disconnect))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Status Endpoints ===

#[derive(Serialize)]
struct StatusResponse {
    telemetry_live: bool,
    packets_received: u64,
    session_uid: Option<u64>,
    packet_format: u16,
    session_kind: Option<SessionKind>,
    tracked_competitors: usize,
    queue: QueueStatus,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let store = state.store.read().await;

    let response = Json(StatusResponse {
        telemetry_live: state.is_telemetry_live(),
        packets_received: store.packets_received(),
        session_uid: store.session_uid(),
        packet_format: store.packet_format(),
        session_kind: store.competitors().next().map(|c| c.session_kind),
        tracked_competitors: store.tracked_indices().len(),
        queue: state.audio.status(),
    });
    response
}

async fn competitors(State(state): State<AppState>) -> Json<Vec<CompetitorState>> {
    let store = state.store.read().await;
    Json(store.competitors().cloned().collect())
}

/// Cars with a known running position, in slot order
async fn field(State(state): State<AppState>) -> Json<Vec<CarSnapshot>> {
    let store = state.store.read().await;
    Json(
        store
            .field()
            .iter()
            .filter(|car| car.position > 0)
            .copied()
            .collect(),
    )
}

// === Event Stream Endpoint ===

async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(advisory) => match serde_json::to_string(&advisory) {
                Ok(json) => Some(Ok(Event::default()
                    .event(advisory.kind().name())
                    .data(json))),
                Err(e) => {
                    tracing::error!("Failed to serialize advisory: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Broadcast stream error: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// === Radio Control Endpoints ===

async fn mute(State(state): State<AppState>) -> Json<QueueStatus> {
    state.audio.set_muted(true);
    Json(state.audio.status())
}

async fn unmute(State(state): State<AppState>) -> Json<QueueStatus> {
    state.audio.set_muted(false);
    Json(state.audio.status())
}

async fn connect(
    State(state): State<AppState>,
) -> Result<Json<QueueStatus>, (StatusCode, String)> {
    state
        .audio
        .connect()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Failed to connect: {}", e)))?;
    Ok(Json(state.audio.status()))
}

async fn disconnect(
    State(state): State<AppState>,
) -> Result<Json<QueueStatus>, (StatusCode, String)> {
    state
        .audio
        .disconnect()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Failed to disconnect: {}", e)))?;
    Ok(Json(state.audio.status()))
}
