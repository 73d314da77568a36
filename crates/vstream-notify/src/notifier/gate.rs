//! Subscription admission.
//!
//! A join is admitted only for the owner of the video's channel. Lookup
//! failures deny, same as not-found.

use std::sync::Arc;

use tracing::warn;

use vstream_models::{TopicPath, Video};

use crate::auth::Identity;
use crate::catalog::{OwnershipLookup, VideoLookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    VideoNotFound,
    ChannelNotFound,
    NotOwner,
    LookupFailed,
}

/// Outcome of a join check.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Denied(DenyReason),
    /// Encode already finished; answer with this record instead of joining.
    Completed(Video),
    /// Still encoding; subscribe to the room.
    Pending,
}

pub struct AuthorizationGate {
    videos: Arc<dyn VideoLookup>,
    owners: Arc<dyn OwnershipLookup>,
}

impl AuthorizationGate {
    pub fn new(videos: Arc<dyn VideoLookup>, owners: Arc<dyn OwnershipLookup>) -> Self {
        Self { videos, owners }
    }

    pub async fn check(&self, topic: &TopicPath, identity: &Identity) -> Admission {
        let video_id = topic.video_id();

        let video = match self.videos.find_video(video_id).await {
            Ok(Some(video)) => video,
            Ok(None) => return Admission::Denied(DenyReason::VideoNotFound),
            Err(e) => {
                warn!(video_id = %video_id, "Video lookup failed: {}", e);
                return Admission::Denied(DenyReason::LookupFailed);
            }
        };

        let owner = match self.owners.channel_owner(&video.channel_id).await {
            Ok(Some(owner)) => owner,
            Ok(None) => return Admission::Denied(DenyReason::ChannelNotFound),
            Err(e) => {
                warn!(channel_id = %video.channel_id, "Owner lookup failed: {}", e);
                return Admission::Denied(DenyReason::LookupFailed);
            }
        };

        if !identity.is(&owner) {
            return Admission::Denied(DenyReason::NotOwner);
        }

        if video.status.is_terminal() {
            Admission::Completed(video)
        } else {
            Admission::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, CatalogResult, MemoryCatalog};
    use async_trait::async_trait;
    use vstream_models::{Channel, VideoId, VideoStatus};

    async fn gate_with(videos: Vec<Video>) -> AuthorizationGate {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.upsert_channel(Channel::new("c1", "u1", "main")).await;
        for video in videos {
            catalog.upsert_video(video).await;
        }
        AuthorizationGate::new(catalog.clone(), catalog)
    }

    #[tokio::test]
    async fn test_owner_of_encoding_video_is_pending() {
        let gate = gate_with(vec![Video::new("v1", "c1", "clip")]).await;
        let admission = gate.check(&TopicPath::encode("v1"), &Identity::user("u1")).await;
        assert_eq!(admission, Admission::Pending);
    }

    #[tokio::test]
    async fn test_owner_of_finished_video_takes_fast_path() {
        let video = Video::new("v1", "c1", "clip").activate(12.5);
        let gate = gate_with(vec![video.clone()]).await;

        match gate.check(&TopicPath::encode("v1"), &Identity::user("u1")).await {
            Admission::Completed(found) => {
                assert_eq!(found.id, video.id);
                assert_eq!(found.status, VideoStatus::Active);
            }
            other => panic!("expected fast path, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inactive_video_is_terminal_too() {
        let mut video = Video::new("v1", "c1", "clip");
        video.status = VideoStatus::Inactive;
        let gate = gate_with(vec![video]).await;

        assert!(matches!(
            gate.check(&TopicPath::encode("v1"), &Identity::user("u1")).await,
            Admission::Completed(_)
        ));
    }

    #[tokio::test]
    async fn test_non_owner_and_anonymous_denied() {
        let gate = gate_with(vec![Video::new("v1", "c1", "clip")]).await;
        let topic = TopicPath::encode("v1");

        assert_eq!(
            gate.check(&topic, &Identity::user("u2")).await,
            Admission::Denied(DenyReason::NotOwner)
        );
        assert_eq!(
            gate.check(&topic, &Identity::anonymous()).await,
            Admission::Denied(DenyReason::NotOwner)
        );
    }

    #[tokio::test]
    async fn test_missing_records_denied() {
        let gate = gate_with(vec![Video::new("v2", "c-missing", "orphan")]).await;

        assert_eq!(
            gate.check(&TopicPath::encode("v1"), &Identity::user("u1")).await,
            Admission::Denied(DenyReason::VideoNotFound)
        );
        assert_eq!(
            gate.check(&TopicPath::encode("v2"), &Identity::user("u1")).await,
            Admission::Denied(DenyReason::ChannelNotFound)
        );
    }

    struct Failing;

    #[async_trait]
    impl VideoLookup for Failing {
        async fn find_video(&self, _id: &VideoId) -> CatalogResult<Option<Video>> {
            Err(CatalogError::Backend("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_lookup_error_denies() {
        let catalog = Arc::new(MemoryCatalog::new());
        let gate = AuthorizationGate::new(Arc::new(Failing), catalog);

        assert_eq!(
            gate.check(&TopicPath::encode("v1"), &Identity::user("u1")).await,
            Admission::Denied(DenyReason::LookupFailed)
        );
    }
}
