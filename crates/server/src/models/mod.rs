use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single chat message.
///
/// The core fields (author, room, kind, creation time) are immutable after
/// creation. `delivered_to` and `read_by` are append-only and only ever grow;
/// `reactions` holds at most one entry per user. Deletion is a soft flag,
/// the row is never physically removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub author: String,
    #[serde(flatten)]
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub delivered_to: Vec<String>,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn new(
        room_id: impl Into<String>,
        author: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            author: author.into(),
            kind,
            created_at: Utc::now(),
            edited: false,
            edited_at: None,
            deleted: false,
            delivered_to: Vec::new(),
            read_by: Vec::new(),
            reactions: Vec::new(),
        }
    }
}

/// Message payload variants. Content lives on the variant that has it,
/// so a file message never carries a nullable text body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "body")]
pub enum MessageKind {
    Text {
        content: String,
    },
    Image {
        url: String,
        caption: Option<String>,
    },
    File {
        url: String,
        name: String,
        size: u64,
        mime: String,
    },
}

/// One user's reaction to a message. A user has at most one reaction per
/// message; re-reacting with the same emoji removes it, a different emoji
/// replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub user: String,
    pub emoji: String,
    pub at: DateTime<Utc>,
}

/// A chat channel. Soft-deleted channels keep their row for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl Channel {
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_by: created_by.into(),
            created_at: Utc::now(),
            deleted: false,
        }
    }
}

/// Display-ready user info attached to reaction broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
}

/// A reaction resolved to its display-ready user summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub user: UserSummary,
}
