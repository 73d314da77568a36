//! Topic paths clients subscribe to.

use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::video::VideoId;

const VIDEO_SEGMENT: &str = "video";
const ENCODE_SEGMENT: &str = "encode";

/// Encode-status topic of one video, `video/<id>/encode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPath {
    path: String,
    video_id: VideoId,
}

impl TopicPath {
    /// Topic that reports the encode completion of `video_id`.
    pub fn encode(video_id: impl Into<VideoId>) -> Self {
        let video_id = video_id.into();
        Self {
            path: format!("{}/{}/{}", VIDEO_SEGMENT, video_id, ENCODE_SEGMENT),
            video_id,
        }
    }

    /// Parse a topic path; only the exact three-segment form is accepted.
    pub fn parse(path: &str) -> Result<Self, ModelError> {
        let mut segments = path.split('/');
        match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(VIDEO_SEGMENT), Some(id), Some(ENCODE_SEGMENT), None) if !id.is_empty() => {
                Ok(Self::encode(id))
            }
            _ => Err(ModelError::InvalidTopic(path.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl FromStr for TopicPath {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
