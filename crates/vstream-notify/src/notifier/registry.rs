//! Process-wide index from topic path to room.
//!
//! Lookups take the read lock and may run from any task. Insertions and
//! removals happen only inside the supervisor loop, which re-checks the map
//! before constructing a room, so at most one room exists per path.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use vstream_models::TopicPath;

use super::room::{RoomHandle, RoomId};
use super::supervisor::SupervisorHandle;
use super::NotifyResult;

#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<TopicPath, RoomHandle>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live room for `topic`, if any.
    pub async fn lookup(&self, topic: &TopicPath) -> Option<RoomHandle> {
        self.rooms.read().await.get(topic).cloned()
    }

    /// Return the room for `topic`, asking the supervisor to install one
    /// when none exists yet.
    pub async fn resolve(
        &self,
        topic: &TopicPath,
        supervisor: &SupervisorHandle,
    ) -> NotifyResult<RoomHandle> {
        if let Some(room) = self.lookup(topic).await {
            return Ok(room);
        }
        supervisor.install_room(topic.clone()).await
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }

    /// Register a freshly constructed room. Supervisor loop only, after it
    /// has re-checked that the path is free.
    pub(super) async fn insert(&self, room: RoomHandle) {
        self.rooms.write().await.insert(room.topic().clone(), room);
    }

    /// Remove `topic` only if it still maps to room `id`. Supervisor loop only.
    pub(super) async fn remove_if(&self, topic: &TopicPath, id: RoomId) -> bool {
        let mut rooms = self.rooms.write().await;
        match rooms.get(topic) {
            Some(room) if room.id() == id => {
                rooms.remove(topic);
                true
            }
            _ => false,
        }
    }
}
