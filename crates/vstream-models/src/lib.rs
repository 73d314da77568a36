//! Shared data models for the VStream encode notifier.
//!
//! This crate provides Serde-serializable types for:
//! - Videos, channels and their identifiers
//! - Encode-status topic paths
//! - WebSocket command and event frames

pub mod error;
pub mod topic;
pub mod video;
pub mod ws;

// Re-export common types
pub use error::ModelError;
pub use topic::TopicPath;
pub use video::{Channel, ChannelId, EncoderUpdate, UserId, Video, VideoId, VideoStatus};
pub use ws::{ClientCommand, ServerMessage, EVENT_ENCODED, EVENT_READY};
