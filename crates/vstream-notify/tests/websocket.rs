//! End-to-end tests using a real WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use vstream_models::{Channel, TopicPath, UserId, Video, VideoId};
use vstream_notify::auth::{issue_upload_token, issue_user_token};
use vstream_notify::{create_router, AppState, MemoryCatalog, NotifyConfig, WsConfig};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);
const AUTH_KEY: &str = "test-auth-key";
const UPLOAD_KEY: &str = "test-upload-key";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: AppState,
}

/// Seed: channel `c1` owned by `u1`, video `v1` still encoding.
async fn boot_server(ws: WsConfig) -> TestServer {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.upsert_channel(Channel::new("c1", "u1", "main")).await;
    catalog.upsert_video(Video::new("v1", "c1", "first upload")).await;

    let config = NotifyConfig {
        auth_sign_key: AUTH_KEY.to_string(),
        upload_sign_key: UPLOAD_KEY.to_string(),
        ws,
        ..NotifyConfig::default()
    };
    let state = AppState::with_catalog(config, catalog);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state.clone(), None);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state }
}

async fn default_server() -> TestServer {
    boot_server(WsConfig::default()).await
}

/// Connect, optionally as `user`, and consume the `ready` event.
async fn connect(server: &TestServer, user: Option<&str>) -> WsStream {
    let url = match user {
        Some(user) => {
            let token = issue_user_token(AUTH_KEY, &UserId::from(user)).unwrap();
            format!("ws://{}/ws?authorization=Bearer%20{}", server.addr, token)
        }
        None => format!("ws://{}/ws", server.addr),
    };
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    let ready = next_event(&mut ws).await;
    assert_eq!(ready, json!({"cmd": "emit", "event": "ready", "data": null}));
    ws
}

async fn join(ws: &mut WsStream, video_id: &str) {
    let frame = json!({"cmd": "join", "data": format!("video/{}/encode", video_id)});
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next JSON event, skipping control frames.
async fn next_event(ws: &mut WsStream) -> Value {
    timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str::<Value>(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {:?}", other),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Assert that no text frame arrives for a while.
async fn assert_silent(ws: &mut WsStream) {
    let result = timeout(QUIET, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {:?}", other),
            }
        }
    })
    .await;
    if let Ok(text) = result {
        panic!("unexpected event: {}", text);
    }
}

async fn wait_for_subscribers(server: &TestServer, video_id: &str, count: usize) {
    let topic = TopicPath::encode(video_id);
    timeout(TIMEOUT, async {
        loop {
            if let Some(room) = server.state.notifier.registry().lookup(&topic).await {
                if room.subscribers().await.map(|s| s.len()).unwrap_or(0) == count {
                    return;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber count never reached");
}

async fn wait_for_connections(server: &TestServer, count: usize) {
    timeout(TIMEOUT, async {
        while server.state.notifier.stats().await.unwrap().connections != count {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count never reached");
}

/// Finish the encode through the HTTP endpoint, as the encoder would.
/// Returns the record the endpoint stored.
async fn finish_encode(server: &TestServer, video_id: &str) -> Video {
    let token = issue_upload_token(UPLOAD_KEY, &VideoId::from(video_id)).unwrap();
    let body = json!({"duration": 42.0, "status": "active"});

    let response = create_router(server.state.clone(), None)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/videos/{}/encoded", video_id))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn owner_receives_single_encoded_event() {
    let server = default_server().await;
    let mut owner = connect(&server, Some("u1")).await;

    join(&mut owner, "v1").await;
    wait_for_subscribers(&server, "v1", 1).await;
    assert_silent(&mut owner).await;

    let video = finish_encode(&server, "v1").await;

    let event = next_event(&mut owner).await;
    assert_eq!(event["cmd"], "emit");
    assert_eq!(event["event"], "encoded");
    assert_eq!(event["data"]["id"], "v1");
    assert_eq!(event["data"]["status"], "ACTIVE");
    assert_eq!(event["data"]["duration"], json!(video.duration));
    assert_eq!(event["data"]["channel_id"], "c1");
    assert_eq!(event["data"]["updated_at"], json!(video.updated_at));

    wait_for_subscribers(&server, "v1", 0).await;
    assert_silent(&mut owner).await;
}

#[tokio::test]
async fn late_join_takes_fast_path() {
    let server = default_server().await;
    let mut first = connect(&server, Some("u1")).await;
    join(&mut first, "v1").await;
    wait_for_subscribers(&server, "v1", 1).await;
    finish_encode(&server, "v1").await;
    assert_eq!(next_event(&mut first).await["event"], "encoded");

    let mut late = connect(&server, Some("u1")).await;
    join(&mut late, "v1").await;

    let event = next_event(&mut late).await;
    assert_eq!(event["event"], "encoded");
    assert_eq!(event["data"]["status"], "ACTIVE");
    wait_for_subscribers(&server, "v1", 0).await;
}

#[tokio::test]
async fn anonymous_client_never_receives() {
    let server = default_server().await;
    let mut anonymous = connect(&server, None).await;

    join(&mut anonymous, "v1").await;
    assert_silent(&mut anonymous).await;

    finish_encode(&server, "v1").await;
    assert_silent(&mut anonymous).await;

    // Also denied once the job is finished: no fast path for strangers.
    join(&mut anonymous, "v1").await;
    assert_silent(&mut anonymous).await;
}

#[tokio::test]
async fn non_owner_never_receives() {
    let server = default_server().await;
    let mut owner = connect(&server, Some("u1")).await;
    let mut stranger = connect(&server, Some("u2")).await;

    join(&mut stranger, "v1").await;
    join(&mut owner, "v1").await;
    wait_for_subscribers(&server, "v1", 1).await;

    finish_encode(&server, "v1").await;

    assert_eq!(next_event(&mut owner).await["event"], "encoded");
    assert_silent(&mut stranger).await;
}

#[tokio::test]
async fn two_owner_sessions_each_receive_once() {
    let server = default_server().await;
    let mut a = connect(&server, Some("u1")).await;
    let mut b = connect(&server, Some("u1")).await;

    join(&mut a, "v1").await;
    join(&mut b, "v1").await;
    wait_for_subscribers(&server, "v1", 2).await;

    finish_encode(&server, "v1").await;

    assert_eq!(next_event(&mut a).await["event"], "encoded");
    assert_eq!(next_event(&mut b).await["event"], "encoded");
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn disconnect_leaves_room() {
    let server = default_server().await;
    let mut stays = connect(&server, Some("u1")).await;
    let mut leaves = connect(&server, Some("u1")).await;

    join(&mut stays, "v1").await;
    join(&mut leaves, "v1").await;
    wait_for_subscribers(&server, "v1", 2).await;

    leaves.close(None).await.unwrap();
    drop(leaves);

    wait_for_subscribers(&server, "v1", 1).await;
    wait_for_connections(&server, 1).await;

    finish_encode(&server, "v1").await;
    assert_eq!(next_event(&mut stays).await["event"], "encoded");
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let server = default_server().await;
    let mut owner = connect(&server, Some("u1")).await;

    for frame in [
        "not json",
        r#"{"cmd":"leave","data":"video/v1/encode"}"#,
        r#"{"cmd":"join","data":42}"#,
        r#"{"cmd":"join","data":"video/v1"}"#,
        r#"{"cmd":"join","data":"video//encode"}"#,
        r#"{"cmd":"join","data":"channel/v1/encode"}"#,
        r#"{"cmd":"join","data":"video/missing/encode"}"#,
    ] {
        owner.send(Message::Text(frame.to_string())).await.unwrap();
    }
    owner.send(Message::Binary(b"join".to_vec())).await.unwrap();
    assert_silent(&mut owner).await;

    // The connection survives and still accepts a valid join.
    join(&mut owner, "v1").await;
    wait_for_subscribers(&server, "v1", 1).await;
    finish_encode(&server, "v1").await;
    assert_eq!(next_event(&mut owner).await["event"], "encoded");
}

#[tokio::test]
async fn header_credential_is_accepted() {
    let server = default_server().await;
    let token = issue_user_token(AUTH_KEY, &UserId::from("u1")).unwrap();

    let url = format!("ws://{}/ws", server.addr);
    let mut request = url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("authorization", format!("Bearer {}", token).parse().unwrap());
    let (mut ws, _) = connect_async(request).await.unwrap();
    assert_eq!(next_event(&mut ws).await["event"], "ready");

    join(&mut ws, "v1").await;
    wait_for_subscribers(&server, "v1", 1).await;
}

#[tokio::test]
async fn silent_client_is_dropped_after_read_deadline() {
    let server = boot_server(WsConfig {
        ping_interval: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(300),
        ..WsConfig::default()
    })
    .await;
    let mut ws = connect(&server, Some("u1")).await;
    join(&mut ws, "v1").await;
    wait_for_subscribers(&server, "v1", 1).await;

    // Not polling the socket means pings go unanswered.
    sleep(Duration::from_millis(800)).await;

    wait_for_connections(&server, 0).await;
    wait_for_subscribers(&server, "v1", 0).await;
}

#[tokio::test]
async fn zero_keepalive_settings_fall_back_to_defaults() {
    let server = boot_server(WsConfig {
        ping_interval: Duration::ZERO,
        pong_timeout: Duration::ZERO,
        room_idle_ttl: Duration::ZERO,
        ..WsConfig::default()
    })
    .await;
    let mut ws = connect(&server, Some("u1")).await;
    join(&mut ws, "v1").await;
    wait_for_subscribers(&server, "v1", 1).await;
    assert_eq!(server.state.notifier.stats().await.unwrap().connections, 1);

    finish_encode(&server, "v1").await;
    assert_eq!(next_event(&mut ws).await["event"], "encoded");
}

#[tokio::test]
async fn responsive_client_survives_keepalive() {
    let server = boot_server(WsConfig {
        ping_interval: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(300),
        ..WsConfig::default()
    })
    .await;
    let mut ws = connect(&server, Some("u1")).await;
    join(&mut ws, "v1").await;
    wait_for_subscribers(&server, "v1", 1).await;

    // Polling answers pings with pongs, which resets the read deadline.
    let mut pings = 0;
    let _ = timeout(Duration::from_millis(900), async {
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, Message::Ping(_)) {
                pings += 1;
            }
        }
    })
    .await;
    assert!(pings >= 3, "expected keepalive probes, saw {}", pings);

    assert_eq!(server.state.notifier.stats().await.unwrap().connections, 1);
    finish_encode(&server, "v1").await;
    assert_eq!(next_event(&mut ws).await["event"], "encoded");
}

#[tokio::test]
async fn ready_reflects_live_connections() {
    let server = default_server().await;
    let _a = connect(&server, Some("u1")).await;
    let _b = connect(&server, None).await;
    wait_for_connections(&server, 2).await;

    let response = create_router(server.state.clone(), None)
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["notifier"]["connections"], 2);
}
