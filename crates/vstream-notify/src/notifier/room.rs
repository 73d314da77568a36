//! One-shot topic rooms.
//!
//! Each room owns its subscriber set inside a dedicated control loop; joins,
//! leaves, broadcasts and unsubscribe-all arrive on one queue and are applied
//! in order, so a broadcast always sees a complete set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use vstream_models::TopicPath;

use super::client::{ClientHandle, ClientId};
use super::supervisor::SupervisorHandle;
use super::{NotifyError, NotifyResult};
use crate::metrics;

/// Process-unique room instance id; distinguishes a retired room from its
/// successor on the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room-{}", self.0)
    }
}

enum RoomCommand {
    Join {
        client: ClientHandle,
        ack: oneshot::Sender<()>,
    },
    Leave(ClientId),
    Broadcast(Arc<str>),
    UnsubscribeAll,
    Subscribers(oneshot::Sender<Vec<ClientId>>),
}

/// Cheap, cloneable address of a room's control loop.
#[derive(Clone)]
pub struct RoomHandle {
    id: RoomId,
    topic: TopicPath,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn topic(&self) -> &TopicPath {
        &self.topic
    }

    /// Add `client` to the subscriber set. Resolves once the room loop has
    /// applied the join; fails if the room retired first.
    pub async fn join(&self, client: ClientHandle) -> NotifyResult<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(RoomCommand::Join { client, ack })
            .map_err(|_| self.closed())?;
        done.await.map_err(|_| self.closed())
    }

    pub fn leave(&self, client: ClientId) {
        let _ = self.tx.send(RoomCommand::Leave(client));
    }

    /// Queue `payload` for every current subscriber. Returns false if the
    /// room no longer accepts operations.
    pub fn broadcast(&self, payload: Arc<str>) -> bool {
        self.tx.send(RoomCommand::Broadcast(payload)).is_ok()
    }

    pub fn unsubscribe_all(&self) {
        let _ = self.tx.send(RoomCommand::UnsubscribeAll);
    }

    /// Snapshot of the subscriber set as seen by the room loop.
    pub async fn subscribers(&self) -> NotifyResult<Vec<ClientId>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Subscribers(reply))
            .map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn closed(&self) -> NotifyError {
        NotifyError::RoomClosed(self.topic.to_string())
    }
}

impl fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomHandle")
            .field("id", &self.id)
            .field("topic", &self.topic.as_str())
            .finish()
    }
}

pub(super) struct Room {
    id: RoomId,
    topic: TopicPath,
    subscribers: HashMap<ClientId, ClientHandle>,
    rx: mpsc::UnboundedReceiver<RoomCommand>,
    idle_ttl: Duration,
    supervisor: SupervisorHandle,
}

impl Room {
    pub(super) fn new(
        id: RoomId,
        topic: TopicPath,
        idle_ttl: Duration,
        supervisor: SupervisorHandle,
    ) -> (Self, RoomHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = RoomHandle {
            id,
            topic: topic.clone(),
            tx,
        };
        let room = Self {
            id,
            topic,
            subscribers: HashMap::new(),
            rx,
            idle_ttl,
            supervisor,
        };
        (room, handle)
    }

    /// Control loop. Runs until the room has been empty and idle for
    /// `idle_ttl`, then retires through the supervisor.
    pub(super) async fn run(mut self) {
        debug!(topic = %self.topic, room = %self.id, "Room opened");

        loop {
            let idle = tokio::time::sleep(self.idle_ttl);
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => break,
                },
                _ = idle, if self.subscribers.is_empty() => {
                    self.retire().await;
                    break;
                }
            }
        }

        debug!(topic = %self.topic, room = %self.id, "Room closed");
    }

    fn apply(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { client, ack } => {
                trace!(topic = %self.topic, client_id = %client.id(), "Join");
                self.subscribers.insert(client.id(), client);
                let _ = ack.send(());
            }
            RoomCommand::Leave(id) => {
                trace!(topic = %self.topic, client_id = %id, "Leave");
                self.subscribers.remove(&id);
            }
            RoomCommand::Broadcast(payload) => self.broadcast(payload),
            RoomCommand::UnsubscribeAll => {
                debug!(
                    topic = %self.topic,
                    subscribers = self.subscribers.len(),
                    "Unsubscribing all"
                );
                self.subscribers.clear();
            }
            RoomCommand::Subscribers(reply) => {
                let _ = reply.send(self.subscribers.keys().copied().collect());
            }
        }
    }

    fn broadcast(&mut self, payload: Arc<str>) {
        let before = self.subscribers.len();
        // Subscribers whose queue is closed are tearing down; drop them here.
        self.subscribers.retain(|_, client| client.deliver(Arc::clone(&payload)));
        let delivered = self.subscribers.len();

        metrics::record_room_broadcast(delivered);
        debug!(
            topic = %self.topic,
            delivered,
            pruned = before - delivered,
            "Broadcast"
        );
    }

    /// Deregister from the supervisor, then refuse whatever is still queued.
    /// A refused join surfaces as `RoomClosed` so the caller can retry
    /// against a fresh room.
    async fn retire(&mut self) {
        let removed = self.supervisor.retire_room(self.topic.clone(), self.id).await;
        debug!(topic = %self.topic, room = %self.id, removed, "Room idle, retiring");

        self.rx.close();
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                RoomCommand::Join { .. } => {}
                // Empty at this point, so the remaining ops are no-ops.
                other => self.apply(other),
            }
        }
    }
}
