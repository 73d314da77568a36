//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::notifier::SupervisorStats;
use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub websocket_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifier: Option<SupervisorStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Readiness check endpoint (readiness probe).
/// Reports live connection and room counts from the supervisor loop.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let websocket_enabled = state.notifier.is_enabled();

    match state.notifier.stats().await {
        Ok(stats) => Ok(Json(ReadinessResponse {
            status: "ready".to_string(),
            websocket_enabled,
            notifier: Some(stats),
            error: None,
        })),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "unavailable".to_string(),
                websocket_enabled,
                notifier: None,
                error: Some(e.to_string()),
            }),
        )),
    }
}
