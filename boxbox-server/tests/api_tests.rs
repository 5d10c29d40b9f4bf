//! Integration tests for the boxbox-server HTTP API
//!
//! Uses tower::ServiceExt::oneshot to test routes directly without binding a port.

use axum::body::Body;
use boxbox_server::{
    api::create_router,
    audio::{AudioQueue, QueueConfig},
    state::AppState,
    voice::ConsoleOutput,
};
use boxbox_core::SessionKind;
use http_body_util::BodyExt;
use hyper::Request;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

/// Helper: build a router with AppState returned for further manipulation
fn app_with_state() -> (axum::Router, AppState) {
    let audio = AudioQueue::new(QueueConfig::default(), Arc::new(ConsoleOutput::new()));
    let state = AppState::new(audio);
    let router = create_router(state.clone());
    (router, state)
}

fn app() -> axum::Router {
    app_with_state().0
}

/// Helper: collect response body into JSON
async fn body_json(body: Body) -> Value {
    let collected = body.collect().await.unwrap();
    serde_json::from_slice(&collected.to_bytes()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// ==================== GET /api/status ====================

#[tokio::test]
async fn test_status_before_any_telemetry() {
    let response = app().oneshot(get("/api/status")).await.unwrap();
    assert_eq!(response.status(), 200);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["telemetry_live"], false);
    assert_eq!(json["packets_received"], 0);
    assert!(json["session_uid"].is_null());
    assert_eq!(json["tracked_competitors"], 0);
    assert_eq!(json["queue"]["phase"], "idle");
    assert_eq!(json["queue"]["pending"], 0);
    assert_eq!(json["queue"]["muted"], false);
}

#[tokio::test]
async fn test_status_reports_session() {
    let (app, state) = app_with_state();
    {
        let mut store = state.store.write().await;
        store.mark_packet(Instant::now());
        store.begin_session(0xFEED, 2025);
        store.get_or_create(0).session_kind = SessionKind::Race;
    }
    state.set_telemetry_live(true);

    let json = body_json(app.oneshot(get("/api/status")).await.unwrap().into_body()).await;
    assert_eq!(json["telemetry_live"], true);
    assert_eq!(json["session_uid"], 0xFEED);
    assert_eq!(json["packet_format"], 2025);
    assert_eq!(json["session_kind"], "race");
    assert_eq!(json["tracked_competitors"], 1);
}

// ==================== GET /api/competitors ====================

#[tokio::test]
async fn test_competitors_empty() {
    let response = app().oneshot(get("/api/competitors")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response.into_body()).await, serde_json::json!([]));
}

#[tokio::test]
async fn test_competitors_lists_tracked_cars() {
    let (app, state) = app_with_state();
    {
        let mut store = state.store.write().await;
        let player = store.get_or_create(4);
        player.driver_name = "Norris".to_string();
        player.position = 3;
    }

    let json = body_json(app.oneshot(get("/api/competitors")).await.unwrap().into_body()).await;
    let competitors = json.as_array().unwrap();
    assert_eq!(competitors.len(), 1);
    assert_eq!(competitors[0]["car_index"], 4);
    assert_eq!(competitors[0]["driver_name"], "Norris");
    assert_eq!(competitors[0]["position"], 3);
}

// ==================== GET /api/field ====================

#[tokio::test]
async fn test_field_skips_empty_slots() {
    let (app, state) = app_with_state();
    {
        let mut store = state.store.write().await;
        store.get_snapshot(2).unwrap().position = 1;
        store.get_snapshot(9).unwrap().position = 2;
    }

    let json = body_json(app.oneshot(get("/api/field")).await.unwrap().into_body()).await;
    let field = json.as_array().unwrap();
    assert_eq!(field.len(), 2);
    assert_eq!(field[0]["car_index"], 2);
    assert_eq!(field[1]["position"], 2);
}

// ==================== GET /api/events/stream ====================

#[tokio::test]
async fn test_event_stream_is_sse() {
    let response = app().oneshot(get("/api/events/stream")).await.unwrap();
    assert_eq!(response.status(), 200);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(
        content_type.contains("text/event-stream"),
        "Expected text/event-stream content-type, got: {}",
        content_type
    );
}

// ==================== POST /api/radio/* ====================

#[tokio::test]
async fn test_mute_and_unmute() {
    let (app, state) = app_with_state();

    let response = app.clone().oneshot(post("/api/radio/mute")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response.into_body()).await["muted"], true);
    assert!(state.audio.is_muted());

    let response = app.oneshot(post("/api/radio/unmute")).await.unwrap();
    assert_eq!(body_json(response.into_body()).await["muted"], false);
    assert!(!state.audio.is_muted());
}

#[tokio::test]
async fn test_disconnect_and_connect() {
    let (app, state) = app_with_state();

    let response = app.clone().oneshot(post("/api/radio/disconnect")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response.into_body()).await["connected"], false);
    assert!(!state.audio.status().connected);

    let response = app.oneshot(post("/api/radio/connect")).await.unwrap();
    assert_eq!(body_json(response.into_body()).await["connected"], true);
}

#[tokio::test]
async fn test_radio_routes_reject_get() {
    let response = app().oneshot(get("/api/radio/mute")).await.unwrap();
    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let response = app().oneshot(get("/api/adapters")).await.unwrap();
    assert_eq!(response.status(), 404);
}
