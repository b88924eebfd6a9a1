//! Control Plane (C5): the local HTTP API over the shared event buffer
//! and source registry, plus the native-messaging stdio supervisor
//! that starts/stops/health-checks the `proxy` subprocess.
//!
//! Shaped after `oisp-web`'s `start_server`: same `axum::Router` +
//! permissive `tower_http::cors::CorsLayer` + `axum::serve` shape,
//! generalized from a broadcast-driven live event feed to a
//! snapshot-on-read model (`GET /events` takes a mutex snapshot rather
//! than streaming).

mod api;
pub mod install;
pub mod native_messaging;
pub mod supervisor;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use loggy_core::config::ControlSettings;
use loggy_core::error::StartupError;
use loggy_core::event::EventRingBuffer;
use loggy_registry::SourceRegistry;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// State shared between every HTTP API handler: the same registry and
/// ring buffer the data plane (`loggy-proxy`) writes into.
pub struct AppState {
    pub registry: Arc<SourceRegistry>,
    pub buffer: Arc<Mutex<EventRingBuffer>>,
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health))
        .route("/events", get(api::get_events))
        .route("/clear", post(api::clear_events))
        .route("/sources", get(api::get_sources).post(api::replace_sources))
        .route("/unmatched", get(api::get_unmatched))
        .fallback(api::not_found)
        .layer(cors)
        .with_state(state)
}

/// Serve the HTTP API until `shutdown` is signaled. Bind failures are
/// fatal startup errors, matching `ProxyServer::run`.
pub async fn run_http_api(
    registry: Arc<SourceRegistry>,
    buffer: Arc<Mutex<EventRingBuffer>>,
    settings: ControlSettings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), StartupError> {
    let state = Arc::new(AppState { registry, buffer });
    let app = router(state);

    let addr = format!("{}:{}", settings.bind_host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(StartupError::PortInUse)?;
    info!("control-plane HTTP API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .map_err(StartupError::PortInUse)?;

    Ok(())
}
