//! Real-time encode-completion notifier.
//!
//! Clients connect over WebSocket, ask to `join` the topic of one video's
//! encode job, and receive a single `encoded` event when the job finishes.
//!
//! - [`supervisor`]: the serialized loop owning connections and room creation
//! - [`client`]: one read/write actor pair per socket
//! - [`room`]: one-shot fan-out per topic path
//! - [`registry`]: topic path to room index
//! - [`gate`]: ownership check and fast path for finished jobs

pub mod client;
pub mod gate;
pub mod registry;
pub mod room;
pub mod supervisor;

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use thiserror::Error;
use tracing::{debug, info};

use vstream_models::{ModelError, ServerMessage, TopicPath, Video, VideoId};

use crate::auth::Identity;
use crate::catalog::{OwnershipLookup, VideoLookup};
use crate::config::WsConfig;

pub use client::{ClientHandle, ClientId, ClientState};
pub use gate::{Admission, AuthorizationGate, DenyReason};
pub use registry::RoomRegistry;
pub use room::{RoomHandle, RoomId};
pub use supervisor::{SupervisorHandle, SupervisorStats};

use supervisor::Supervisor;

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to encode message: {0}")]
    Model(#[from] ModelError),

    #[error("Room {0} is closed")]
    RoomClosed(String),

    #[error("Client {0} is closed")]
    ClientClosed(ClientId),

    #[error("Connection supervisor is not running")]
    SupervisorGone,
}

/// Everything a client or room task needs to reach shared services.
#[derive(Clone)]
pub struct NotifierContext {
    pub config: WsConfig,
    pub gate: Arc<AuthorizationGate>,
    pub registry: RoomRegistry,
    pub supervisor: SupervisorHandle,
}

/// Entry point used by the HTTP layer.
#[derive(Clone)]
pub struct Notifier {
    ctx: NotifierContext,
}

impl Notifier {
    /// Spawn the supervisor loop and return a handle to it. Must be called
    /// from within a Tokio runtime.
    pub fn start(
        config: WsConfig,
        videos: Arc<dyn VideoLookup>,
        owners: Arc<dyn OwnershipLookup>,
    ) -> Self {
        let (supervisor, rx) = Supervisor::channel();
        let ctx = NotifierContext {
            config: config.normalized(),
            gate: Arc::new(AuthorizationGate::new(videos, owners)),
            registry: RoomRegistry::new(),
            supervisor,
        };

        tokio::spawn(Supervisor::new(rx, ctx.clone()).run());
        info!(
            enabled = ctx.config.enabled,
            ping_interval_ms = ctx.config.ping_interval.as_millis() as u64,
            pong_timeout_ms = ctx.config.pong_timeout.as_millis() as u64,
            "Notifier started"
        );

        Self { ctx }
    }

    pub fn is_enabled(&self) -> bool {
        self.ctx.config.enabled
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.ctx.registry
    }

    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.ctx.supervisor
    }

    /// Register an upgraded socket.
    pub fn accept(&self, socket: WebSocket, identity: Identity) -> NotifyResult<()> {
        self.ctx.supervisor.accept(socket, identity)
    }

    /// Look up or install the room for `topic`.
    pub async fn resolve(&self, topic: &TopicPath) -> NotifyResult<RoomHandle> {
        self.ctx.registry.resolve(topic, &self.ctx.supervisor).await
    }

    /// Deliver the `encoded` event for `video_id` to everyone waiting on it,
    /// then clear the room. Returns false when nothing was published, either
    /// because the subsystem is disabled or because no room exists.
    pub async fn publish_completion(&self, video_id: &VideoId, video: &Video) -> NotifyResult<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }

        let topic = TopicPath::encode(video_id.clone());
        let Some(room) = self.ctx.registry.lookup(&topic).await else {
            debug!(video_id = %video_id, "No room to publish to");
            return Ok(false);
        };

        let payload: Arc<str> = Arc::from(ServerMessage::encoded(video)?.to_json()?);
        if !room.broadcast(payload) {
            debug!(video_id = %video_id, room = %room.id(), "Room retired before publish");
            return Ok(false);
        }
        room.unsubscribe_all();

        info!(video_id = %video_id, room = %room.id(), "Published encode completion");
        Ok(true)
    }

    pub async fn stats(&self) -> NotifyResult<SupervisorStats> {
        self.ctx.supervisor.stats().await
    }
}
