//! WebSocket upgrade endpoint.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::IdentityResolver;
use crate::metrics;
use crate::state::AppState;

/// Upgrade query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// `Bearer <token>`; browsers cannot set headers on an upgrade request.
    pub authorization: Option<String>,
}

/// `GET /ws`: resolve the caller, then hand the socket to the supervisor.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let credential = params.authorization.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    let identity = state.verifier.resolve(credential.as_deref());

    metrics::record_ws_connection(if identity.is_anonymous() {
        "anonymous"
    } else {
        "user"
    });
    debug!(user = %identity, "WebSocket upgrade");

    let notifier = state.notifier.clone();
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = notifier.accept(socket, identity) {
            warn!("Dropping connection: {}", e);
        }
    })
}
