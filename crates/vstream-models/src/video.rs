//! Video and channel records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ModelError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of an uploaded video.
    VideoId
);

string_id!(
    /// Identifier of a channel that owns videos.
    ChannelId
);

string_id!(
    /// Identifier of a registered user.
    UserId
);

/// Publication status of a video.
///
/// Only `Encoding` is non-terminal; an encode job that finishes moves the
/// video to `Active`, a removed video is `Inactive`. Serialized upper-case,
/// accepted in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    Active,
    #[default]
    Encoding,
    Inactive,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Active => "ACTIVE",
            VideoStatus::Encoding => "ENCODING",
            VideoStatus::Inactive => "INACTIVE",
        }
    }

    /// Whether the encode job behind this status has finished.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VideoStatus::Encoding)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(VideoStatus::Active),
            "ENCODING" => Ok(VideoStatus::Encoding),
            "INACTIVE" => Ok(VideoStatus::Inactive),
            _ => Err(ModelError::InvalidStatus(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for VideoStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Video record as served by the API and carried by the `encoded` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Video {
    pub id: VideoId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Length in seconds, filled in by the encoder.
    #[serde(default)]
    pub duration: f32,
    #[serde(default)]
    pub status: VideoStatus,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub dislikes: u64,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Video {
    /// Create a freshly uploaded video that is still encoding.
    pub fn new(id: impl Into<VideoId>, channel_id: impl Into<ChannelId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            title: title.into(),
            description: String::new(),
            duration: 0.0,
            status: VideoStatus::Encoding,
            likes: 0,
            dislikes: 0,
            posted_at: None,
            updated_at: Utc::now(),
            deactivated_at: None,
        }
    }

    /// Mark the encode job as finished.
    pub fn activate(mut self, duration: f32) -> Self {
        let now = Utc::now();
        self.status = VideoStatus::Active;
        self.duration = duration;
        self.posted_at.get_or_insert(now);
        self.updated_at = now;
        self
    }
}

/// Fields an encoder may change on an existing video. Everything else,
/// ownership included, is left as stored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct EncoderUpdate {
    /// Optional echo of the target id; checked against the request path.
    #[serde(default)]
    pub id: Option<VideoId>,
    #[serde(default)]
    pub duration: Option<f32>,
    #[serde(default)]
    pub status: Option<VideoStatus>,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
}

impl EncoderUpdate {
    /// True when the update carries no editable field.
    pub fn is_empty(&self) -> bool {
        self.duration.is_none() && self.status.is_none() && self.posted_at.is_none()
    }

    /// Merge into `video` and stamp `updated_at`.
    pub fn apply(&self, video: &mut Video) {
        if let Some(duration) = self.duration {
            video.duration = duration;
        }
        if let Some(status) = self.status {
            video.status = status;
        }
        if let Some(posted_at) = self.posted_at {
            video.posted_at = Some(posted_at);
        }
        video.updated_at = Utc::now();
    }
}

/// Channel record; only the owner is relevant to the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Channel {
    pub id: ChannelId,
    pub owner: UserId,
    #[serde(default)]
    pub name: String,
}

impl Channel {
    pub fn new(id: impl Into<ChannelId>, owner: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            name: name.into(),
        }
    }
}
