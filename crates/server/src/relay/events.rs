//! Typed wire events.
//!
//! Inbound events arrive as internally-tagged JSON and are dispatched through
//! a single match in the connection loop; outbound events mirror the frontend
//! frame types with camelCase field names.

use crate::models::{Message, ReactionSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events a client may send over its WebSocket connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },

    /// Text or image message into a channel (`roomId`) or a direct
    /// conversation (`recipient`). Exactly one of the two must be present.
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        #[serde(default)]
        room_id: Option<String>,
        #[serde(default)]
        recipient: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        image_url: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    FileMessage {
        #[serde(default)]
        room_id: Option<String>,
        #[serde(default)]
        recipient: Option<String>,
        file_url: String,
        file_name: String,
        file_size: u64,
        file_type: String,
    },

    #[serde(rename_all = "camelCase")]
    Typing { room_id: String },

    #[serde(rename_all = "camelCase")]
    StopTyping { room_id: String },

    #[serde(rename_all = "camelCase")]
    EditMessage { message_id: String, content: String },

    #[serde(rename_all = "camelCase")]
    DeleteMessage { message_id: String },

    #[serde(rename_all = "camelCase")]
    MessageRead { message_id: String },

    #[serde(rename_all = "camelCase")]
    ReactToMessage { message_id: String, emoji: String },

    #[serde(rename_all = "camelCase")]
    CallRequest {
        to: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename_all = "camelCase")]
    CallAccept {
        to: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename_all = "camelCase")]
    CallReject {
        to: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename_all = "camelCase")]
    Offer {
        to: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename_all = "camelCase")]
    Answer {
        to: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        to: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename_all = "camelCase")]
    CallEnd {
        to: String,
        #[serde(default)]
        data: Value,
    },
}

/// Online/offline flag carried by presence broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceFlag {
    Online,
    Offline,
}

/// Events the relay pushes to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Sent once at handshake to the registering connection only.
    #[serde(rename_all = "camelCase")]
    CurrentOnline { user_ids: Vec<String> },

    #[serde(rename_all = "camelCase")]
    UserStatus { user_id: String, status: PresenceFlag },

    MessageReceived { message: Message },

    FileMessage { message: Message },

    MessageEdited { message: Message },

    MessageDeleted { message: Message },

    #[serde(rename_all = "camelCase")]
    MessageReadUpdate { message_id: String, user_id: String },

    MessageReaction {
        message: Message,
        reactions: Vec<ReactionSummary>,
    },

    #[serde(rename_all = "camelCase")]
    Typing { room_id: String, sender: String },

    #[serde(rename_all = "camelCase")]
    StopTyping { room_id: String, sender: String },

    Error { message: String },

    CallRequest { from: String, data: Value },
    CallAccept { from: String, data: Value },
    CallReject { from: String, data: Value },
    Offer { from: String, data: Value },
    Answer { from: String, data: Value },
    IceCandidate { from: String, data: Value },
    CallEnd { from: String, data: Value },

    #[serde(rename_all = "camelCase")]
    PeerLeft { room_id: String, user_id: String },

    ChannelsUpdated,

    UsersUpdated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_parses_direct_form() {
        let raw = r#"{"type":"chatMessage","recipient":"user-b","content":"hi"}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::ChatMessage {
                room_id,
                recipient,
                content,
                image_url,
            } => {
                assert!(room_id.is_none());
                assert_eq!(recipient.as_deref(), Some("user-b"));
                assert_eq!(content.as_deref(), Some("hi"));
                assert!(image_url.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn signaling_data_defaults_to_null() {
        let raw = r#"{"type":"callRequest","to":"user-c"}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::CallRequest { to, data } => {
                assert_eq!(to, "user-c");
                assert!(data.is_null());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn outbound_events_use_camel_case_tags() {
        let event = ServerEvent::MessageReadUpdate {
            message_id: "m1".to_string(),
            user_id: "u1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "messageReadUpdate");
        assert_eq!(json["messageId"], "m1");
        assert_eq!(json["userId"], "u1");
    }
}
