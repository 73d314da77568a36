//! HTTP routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{health, publish_encoded, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;
use crate::ws::ws_handler;

/// Video records are small; anything larger is rejected outright.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Create the router. `/ws` is mounted only when the WebSocket subsystem is
/// enabled, `/metrics` only when a Prometheus handle is supplied.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let video_routes = Router::new().route("/videos/:video_id/encoded", post(publish_encoded));

    let ws_routes = if state.notifier.is_enabled() {
        Router::new().route("/ws", get(ws_handler))
    } else {
        Router::new()
    };

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(video_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
