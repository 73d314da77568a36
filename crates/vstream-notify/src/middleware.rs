//! HTTP middleware.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, Response};
use axum::middleware::Next;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Paths too chatty to log on every hit.
const QUIET_PATHS: &[&str] = &["/health", "/ready", "/metrics"];

/// Request id carried in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Create CORS layer.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let max_age = Duration::from_secs(600);

    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(Any)
            .max_age(max_age);
    }

    // Credentials cannot be combined with wildcard headers.
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .allow_origin(origins)
        .max_age(max_age)
}

/// Request ID middleware: reuse the caller's id or mint one.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Request logging middleware.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request.extensions().get::<RequestId>().map(|r| r.0.clone());
    let start = Instant::now();

    let response = next.run(request).await;

    if !QUIET_PATHS.contains(&uri.path()) {
        info!(
            method = %method,
            uri = %uri,
            status = %response.status(),
            duration_ms = %start.elapsed().as_millis(),
            request_id = request_id.as_deref().unwrap_or("-"),
            "Request completed"
        );
    }

    response
}
