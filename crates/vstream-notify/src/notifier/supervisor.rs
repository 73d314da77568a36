//! Connection supervisor.
//!
//! A single control loop that serializes every mutation of process-wide
//! state: client registration, client deregistration, room installation and
//! room retirement. Room creation is double-checked inside the loop, so two
//! clients racing to open the same topic always end up in one room.

use std::collections::HashMap;

use axum::extract::ws::WebSocket;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use vstream_models::TopicPath;

use super::client::{self, ClientHandle, ClientId};
use super::room::{Room, RoomHandle, RoomId};
use super::{NotifierContext, NotifyError, NotifyResult};
use crate::auth::Identity;
use crate::metrics;

pub(super) enum SupervisorCommand {
    Connect {
        socket: WebSocket,
        identity: Identity,
    },
    Deregister(ClientId),
    InstallRoom {
        topic: TopicPath,
        reply: oneshot::Sender<RoomHandle>,
    },
    RetireRoom {
        topic: TopicPath,
        id: RoomId,
        reply: oneshot::Sender<bool>,
    },
    Stats(oneshot::Sender<SupervisorStats>),
}

/// Point-in-time counts reported by the supervisor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    pub connections: usize,
    pub rooms: usize,
}

/// Address of the supervisor loop.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<SupervisorCommand>,
}

impl SupervisorHandle {
    /// Hand an upgraded socket to the supervisor, which assigns the next
    /// client id and starts the client's read and write paths.
    pub fn accept(&self, socket: WebSocket, identity: Identity) -> NotifyResult<()> {
        self.tx
            .send(SupervisorCommand::Connect { socket, identity })
            .map_err(|_| NotifyError::SupervisorGone)
    }

    /// Drop `client` from the live-connection index. Unknown ids are ignored.
    pub fn deregister(&self, client: ClientId) {
        let _ = self.tx.send(SupervisorCommand::Deregister(client));
    }

    /// Return the room for `topic`, constructing and starting it if the
    /// registry still has none once the request reaches the loop.
    pub async fn install_room(&self, topic: TopicPath) -> NotifyResult<RoomHandle> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorCommand::InstallRoom { topic, reply })
            .map_err(|_| NotifyError::SupervisorGone)?;
        rx.await.map_err(|_| NotifyError::SupervisorGone)
    }

    /// Remove `topic` from the registry if it still maps to room `id`.
    pub async fn retire_room(&self, topic: TopicPath, id: RoomId) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(SupervisorCommand::RetireRoom { topic, id, reply })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn stats(&self) -> NotifyResult<SupervisorStats> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorCommand::Stats(reply))
            .map_err(|_| NotifyError::SupervisorGone)?;
        rx.await.map_err(|_| NotifyError::SupervisorGone)
    }
}

pub(super) struct Supervisor {
    rx: mpsc::UnboundedReceiver<SupervisorCommand>,
    ctx: NotifierContext,
    clients: HashMap<ClientId, ClientHandle>,
    next_client: u64,
    next_room: u64,
}

impl Supervisor {
    /// Create the loop's queue. The handle must be placed into the context
    /// before the loop is built with [`Supervisor::new`].
    pub(super) fn channel() -> (SupervisorHandle, mpsc::UnboundedReceiver<SupervisorCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SupervisorHandle { tx }, rx)
    }

    pub(super) fn new(
        rx: mpsc::UnboundedReceiver<SupervisorCommand>,
        ctx: NotifierContext,
    ) -> Self {
        Self {
            rx,
            ctx,
            clients: HashMap::new(),
            next_client: 1,
            next_room: 1,
        }
    }

    pub(super) async fn run(mut self) {
        info!("Connection supervisor started");

        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                SupervisorCommand::Connect { socket, identity } => self.connect(socket, identity),
                SupervisorCommand::Deregister(id) => {
                    if self.clients.remove(&id).is_some() {
                        debug!(client_id = %id, "Client deregistered");
                        metrics::set_ws_active_connections(self.clients.len());
                    }
                }
                SupervisorCommand::InstallRoom { topic, reply } => {
                    let room = self.install_room(topic).await;
                    let _ = reply.send(room);
                }
                SupervisorCommand::RetireRoom { topic, id, reply } => {
                    let removed = self.ctx.registry.remove_if(&topic, id).await;
                    if removed {
                        debug!(topic = %topic, room = %id, "Room retired");
                        metrics::set_rooms_active(self.ctx.registry.len().await);
                    }
                    let _ = reply.send(removed);
                }
                SupervisorCommand::Stats(reply) => {
                    let _ = reply.send(SupervisorStats {
                        connections: self.clients.len(),
                        rooms: self.ctx.registry.len().await,
                    });
                }
            }
        }

        info!("Connection supervisor stopped");
    }

    fn connect(&mut self, socket: WebSocket, identity: Identity) {
        let id = ClientId(self.next_client);
        self.next_client += 1;

        let handle = client::spawn(id, identity, socket, self.ctx.clone());
        self.clients.insert(id, handle);
        metrics::set_ws_active_connections(self.clients.len());
    }

    async fn install_room(&mut self, topic: TopicPath) -> RoomHandle {
        // Another request may have installed it while this one was queued.
        if let Some(existing) = self.ctx.registry.lookup(&topic).await {
            return existing;
        }

        let id = RoomId(self.next_room);
        self.next_room += 1;

        let (room, handle) = Room::new(
            id,
            topic,
            self.ctx.config.room_idle_ttl,
            self.ctx.supervisor.clone(),
        );
        self.ctx.registry.insert(handle.clone()).await;
        tokio::spawn(room.run());

        metrics::set_rooms_active(self.ctx.registry.len().await);
        handle
    }
}
