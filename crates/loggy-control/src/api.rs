//! HTTP API handlers: event/source read access and the
//! full-sync source write path. Every response is JSON; the router in
//! `lib.rs` attaches permissive CORS so a browser extension on any
//! origin can call these directly.

use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use loggy_core::event::CapturedEvent;
use loggy_core::source::{Source, UnmatchedDomain};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<CapturedEvent>,
    pub count: usize,
    #[serde(rename = "unmatchedDomains")]
    pub unmatched_domains: HashMap<String, UnmatchedDomain>,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub async fn health() -> &'static str {
    "ok"
}

/// `GET /events` - a snapshot of the ring buffer plus the current
/// unmatched-domain feedback map, taken independently - these are two
/// separately-guarded resources, not one atomic view.
pub async fn get_events(State(state): State<Arc<AppState>>) -> Json<EventsResponse> {
    let events = state.buffer.lock().await.snapshot();
    let unmatched_domains = state
        .registry
        .unmatched()
        .await
        .into_iter()
        .map(|entry| (entry.domain.clone(), entry))
        .collect();

    Json(EventsResponse {
        count: events.len(),
        events,
        unmatched_domains,
    })
}

/// `POST /clear` - empties the ring buffer and the unmatched-domain map.
pub async fn clear_events(State(state): State<Arc<AppState>>) -> Json<SuccessResponse> {
    state.buffer.lock().await.clear();
    state.registry.clear_unmatched().await;
    Json(SuccessResponse { success: true })
}

pub async fn get_sources(State(state): State<Arc<AppState>>) -> Json<Vec<Source>> {
    Json(state.registry.sources().await)
}

/// `POST /sources` - full sync: the posted list replaces the registry
/// wholesale rather than merging with what's already there.
pub async fn replace_sources(
    State(state): State<Arc<AppState>>,
    Json(sources): Json<Vec<Source>>,
) -> (StatusCode, Json<SuccessResponse>) {
    state.registry.replace_all(sources).await;
    (StatusCode::OK, Json(SuccessResponse { success: true }))
}

pub async fn get_unmatched(State(state): State<Arc<AppState>>) -> Json<Vec<UnmatchedDomain>> {
    Json(state.registry.unmatched().await)
}

pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
