//! WebSocket frame schemas.
//!
//! Inbound frames are `{"cmd": "join", "data": "<topic>"}`; outbound frames
//! are `{"cmd": "emit", "event": "<name>", "data": <payload>}`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;
use crate::video::Video;

/// Sent once right after the upgrade completes.
pub const EVENT_READY: &str = "ready";

/// Sent when an encode job reaches a terminal status.
pub const EVENT_ENCODED: &str = "encoded";

/// Command sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "cmd", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Subscribe to a topic path.
    Join(String),
}

impl ClientCommand {
    /// Parse a text frame. Unknown commands and malformed JSON are errors.
    pub fn from_text(text: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Message pushed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ServerMessage {
    Emit { event: String, data: Value },
}

impl ServerMessage {
    /// Create an emit message with an arbitrary payload.
    pub fn emit(event: impl Into<String>, data: Value) -> Self {
        ServerMessage::Emit {
            event: event.into(),
            data,
        }
    }

    /// Create the connection-ready message.
    pub fn ready() -> Self {
        Self::emit(EVENT_READY, Value::Null)
    }

    /// Create the encode-complete message carrying the updated video.
    pub fn encoded(video: &Video) -> Result<Self, ModelError> {
        Ok(Self::emit(EVENT_ENCODED, serde_json::to_value(video)?))
    }

    /// Name of the emitted event.
    pub fn event(&self) -> &str {
        match self {
            ServerMessage::Emit { event, .. } => event,
        }
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_command_parses() {
        let cmd = ClientCommand::from_text(r#"{"cmd":"join","data":"video/v1/encode"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Join("video/v1/encode".to_string()));
    }

    #[test]
    fn test_join_command_ignores_extra_fields() {
        let cmd = ClientCommand::from_text(r#"{"cmd":"join","data":"video/v1/encode","id":3}"#);
        assert!(cmd.is_ok());
    }

    #[test]
    fn test_unrecognized_frames_fail() {
        for text in [
            "not json",
            r#"{"cmd":"leave","data":"video/v1/encode"}"#,
            r#"{"cmd":"join","data":42}"#,
            r#"{"cmd":"join"}"#,
            r#"{"data":"video/v1/encode"}"#,
            r#"[1,2,3]"#,
        ] {
            assert!(ClientCommand::from_text(text).is_err(), "accepted {text}");
        }
    }

    #[test]
    fn test_ready_wire_format() {
        let value: Value = serde_json::from_str(&ServerMessage::ready().to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"cmd": "emit", "event": "ready", "data": null}));
    }

    #[test]
    fn test_encoded_carries_video() {
        let video = Video::new("v1", "c1", "title").activate(3.0);
        let msg = ServerMessage::encoded(&video).unwrap();
        assert_eq!(msg.event(), EVENT_ENCODED);

        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["cmd"], "emit");
        assert_eq!(value["data"]["id"], "v1");
        assert_eq!(value["data"]["status"], "ACTIVE");
    }

    #[test]
    fn test_schema_describes_command_tag() {
        let schema = schemars::schema_for!(ClientCommand);
        let text = serde_json::to_string(&schema).unwrap();
        assert!(text.contains("\"cmd\""));
        assert!(text.contains("join"));
    }
}
