//! Resource and ownership lookups consumed by the authorization gate.
//!
//! Persistence lives outside this service; the traits here are the seams it
//! is reached through. [`MemoryCatalog`] backs both for the standalone binary
//! and for tests.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use vstream_models::{Channel, ChannelId, UserId, Video, VideoId};

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog seed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog seed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lookup failed: {0}")]
    Backend(String),
}

/// Resource lookup: video id to its current record.
#[async_trait]
pub trait VideoLookup: Send + Sync {
    async fn find_video(&self, id: &VideoId) -> CatalogResult<Option<Video>>;
}

/// Ownership lookup: channel id to the owning user.
#[async_trait]
pub trait OwnershipLookup: Send + Sync {
    async fn channel_owner(&self, id: &ChannelId) -> CatalogResult<Option<UserId>>;
}

/// Seed file layout.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub videos: Vec<Video>,
}

/// In-process catalog of channels and videos.
#[derive(Default)]
pub struct MemoryCatalog {
    videos: RwLock<HashMap<VideoId, Video>>,
    channels: RwLock<HashMap<ChannelId, Channel>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        Self {
            videos: RwLock::new(seed.videos.into_iter().map(|v| (v.id.clone(), v)).collect()),
            channels: RwLock::new(
                seed.channels
                    .into_iter()
                    .map(|c| (c.id.clone(), c))
                    .collect(),
            ),
        }
    }

    /// Load a seed file of the form `{"channels": [...], "videos": [...]}`.
    pub async fn load(path: &Path) -> CatalogResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let seed: CatalogSeed = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            channels = seed.channels.len(),
            videos = seed.videos.len(),
            "Loaded catalog seed"
        );
        Ok(Self::from_seed(seed))
    }

    pub async fn upsert_channel(&self, channel: Channel) {
        self.channels.write().await.insert(channel.id.clone(), channel);
    }

    /// Store a video record, replacing any previous version.
    pub async fn upsert_video(&self, video: Video) {
        self.videos.write().await.insert(video.id.clone(), video);
    }

    /// Apply `edit` to an existing video under the write lock and return the
    /// merged record. Unknown ids are left absent and yield `None`.
    pub async fn update_video(
        &self,
        id: &VideoId,
        edit: impl FnOnce(&mut Video),
    ) -> CatalogResult<Option<Video>> {
        let mut videos = self.videos.write().await;
        Ok(videos.get_mut(id).map(|video| {
            edit(video);
            video.clone()
        }))
    }
}

#[async_trait]
impl VideoLookup for MemoryCatalog {
    async fn find_video(&self, id: &VideoId) -> CatalogResult<Option<Video>> {
        Ok(self.videos.read().await.get(id).cloned())
    }
}

#[async_trait]
impl OwnershipLookup for MemoryCatalog {
    async fn channel_owner(&self, id: &ChannelId) -> CatalogResult<Option<UserId>> {
        Ok(self.channels.read().await.get(id).map(|c| c.owner.clone()))
    }
}
