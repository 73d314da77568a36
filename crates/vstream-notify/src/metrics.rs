//! Prometheus metrics for the notifier.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vstream_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vstream_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vstream_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "vstream_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "vstream_ws_connections_active";
    pub const WS_FRAMES_RECEIVED: &str = "vstream_ws_frames_received_total";
    pub const WS_EVENTS_SENT: &str = "vstream_ws_events_sent_total";

    // Room metrics
    pub const JOIN_DECISIONS_TOTAL: &str = "vstream_join_decisions_total";
    pub const ROOM_BROADCASTS_TOTAL: &str = "vstream_room_broadcasts_total";
    pub const ROOM_BROADCAST_RECIPIENTS: &str = "vstream_room_broadcast_recipients";
    pub const ROOMS_ACTIVE: &str = "vstream_rooms_active";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an accepted WebSocket upgrade.
pub fn record_ws_connection(identity: &str) {
    let labels = [("identity", identity.to_string())];
    counter!(names::WS_CONNECTIONS_TOTAL, &labels).increment(1);
}

pub fn set_ws_active_connections(count: usize) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

pub fn record_ws_frame_received() {
    counter!(names::WS_FRAMES_RECEIVED).increment(1);
}

/// Record an event queued directly to one client.
pub fn record_event_sent(event: &str) {
    let labels = [("event", event.to_string())];
    counter!(names::WS_EVENTS_SENT, &labels).increment(1);
}

/// Record the outcome of a join: `subscribed`, `fast_path` or `denied`.
pub fn record_join_decision(decision: &'static str) {
    counter!(names::JOIN_DECISIONS_TOTAL, "decision" => decision).increment(1);
}

pub fn record_room_broadcast(delivered: usize) {
    counter!(names::ROOM_BROADCASTS_TOTAL).increment(1);
    histogram!(names::ROOM_BROADCAST_RECIPIENTS).record(delivered as f64);
}

pub fn set_rooms_active(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

fn video_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/videos/[^/]+").expect("valid video path pattern"))
}

/// Sanitize path for metrics labels so video ids don't explode cardinality.
fn sanitize_path(path: &str) -> String {
    video_id_pattern()
        .replace_all(path, "/videos/:video_id")
        .into_owned()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}
