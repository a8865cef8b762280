//! Message Router
//!
//! Consumes validated inbound chat events, persists the resulting entity,
//! computes the delivery target set from the Presence Table and Room
//! Membership, and fans the result out. Persistence is awaited before any
//! broadcast, so per-message event order matches store order; no ordering is
//! guaranteed across different messages or rooms.

use super::events::ServerEvent;
use super::presence::PresenceTable;
use super::rooms::{direct_room_id, RoomMembership};
use crate::error::RelayError;
use crate::models::{Message, MessageKind, Reaction, ReactionSummary, UserSummary};
use crate::store::DurableStore;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Destination of a send: an existing channel room, or the other party of a
/// direct conversation.
#[derive(Debug, Clone)]
pub enum SendTarget {
    Channel(String),
    Direct(String),
}

impl SendTarget {
    fn room_id(&self, author: &str) -> String {
        match self {
            SendTarget::Channel(room_id) => room_id.clone(),
            SendTarget::Direct(peer) => direct_room_id(author, peer),
        }
    }
}

pub struct MessageRouter {
    store: Arc<dyn DurableStore>,
    presence: Arc<PresenceTable>,
    rooms: Arc<RoomMembership>,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn DurableStore>,
        presence: Arc<PresenceTable>,
        rooms: Arc<RoomMembership>,
    ) -> Self {
        Self {
            store,
            presence,
            rooms,
        }
    }

    /// Text or image send.
    pub async fn send_chat(
        &self,
        author: &str,
        target: SendTarget,
        content: Option<String>,
        image_url: Option<String>,
    ) -> Result<Message, RelayError> {
        let kind = match image_url {
            Some(url) => MessageKind::Image {
                url,
                caption: content,
            },
            None => {
                let content = content.unwrap_or_default();
                if content.trim().is_empty() {
                    return Err(RelayError::Validation(
                        "Message content is required".to_string(),
                    ));
                }
                MessageKind::Text { content }
            }
        };

        self.deliver(author, target, kind, |message| ServerEvent::MessageReceived { message })
            .await
    }

    /// File send; the blob was already uploaded through the REST facade.
    pub async fn send_file(
        &self,
        author: &str,
        target: SendTarget,
        url: String,
        name: String,
        size: u64,
        mime: String,
    ) -> Result<Message, RelayError> {
        let kind = MessageKind::File {
            url,
            name,
            size,
            mime,
        };
        self.deliver(author, target, kind, |message| ServerEvent::FileMessage { message })
            .await
    }

    /// Persist and fan out. Delivery set = room members plus, for direct
    /// messages, every recipient handle not already joined to the room, so a
    /// recipient with an open DM window receives the message exactly once.
    async fn deliver(
        &self,
        author: &str,
        target: SendTarget,
        kind: MessageKind,
        wrap: fn(Message) -> ServerEvent,
    ) -> Result<Message, RelayError> {
        let room_id = target.room_id(author);
        let mut message = Message::new(room_id.clone(), author, kind);

        // Best-effort delivered flag: the recipient has a live connection at
        // persistence time. Not a read receipt.
        let mut recipient_handles = Vec::new();
        if let SendTarget::Direct(peer) = &target {
            recipient_handles = self.presence.handles_for(peer);
            if !recipient_handles.is_empty() {
                message.delivered_to.push(peer.clone());
            }
        }

        self.store.insert_message(&message).await?;

        let members = self.rooms.members_of(&room_id);
        let member_ids: HashSet<Uuid> = members.iter().map(|h| h.id).collect();
        let event = wrap(message.clone());
        for handle in &members {
            handle.send(event.clone());
        }
        for handle in &recipient_handles {
            if !member_ids.contains(&handle.id) {
                handle.send(event.clone());
            }
        }

        info!("message {} routed to room {}", message.id, room_id);

        Ok(message)
    }

    /// Author-only content edit; broadcasts the updated message to its room.
    pub async fn edit(
        &self,
        author: &str,
        message_id: &str,
        new_content: &str,
    ) -> Result<Message, RelayError> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(RelayError::NotFound)?;
        if message.author != author {
            return Err(RelayError::Forbidden);
        }
        if !matches!(message.kind, MessageKind::Text { .. }) {
            return Err(RelayError::Validation(
                "Only text messages can be edited".to_string(),
            ));
        }
        if new_content.trim().is_empty() {
            return Err(RelayError::Validation(
                "Message content is required".to_string(),
            ));
        }

        let edited_at = Utc::now();
        self.store
            .set_content(message_id, new_content, edited_at)
            .await?;

        let updated = Message {
            kind: MessageKind::Text {
                content: new_content.to_string(),
            },
            edited: true,
            edited_at: Some(edited_at),
            ..message
        };
        self.rooms.broadcast(
            &updated.room_id,
            ServerEvent::MessageEdited {
                message: updated.clone(),
            },
            None,
        );

        Ok(updated)
    }

    /// Author-only soft delete; broadcasts the flagged message, not a
    /// tombstone, so clients render it based on the flag.
    pub async fn delete(&self, author: &str, message_id: &str) -> Result<Message, RelayError> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(RelayError::NotFound)?;
        if message.author != author {
            return Err(RelayError::Forbidden);
        }

        self.store.mark_deleted(message_id).await?;

        let updated = Message {
            deleted: true,
            ..message
        };
        self.rooms.broadcast(
            &updated.room_id,
            ServerEvent::MessageDeleted {
                message: updated.clone(),
            },
            None,
        );

        Ok(updated)
    }

    /// Appends the reader to read-by and broadcasts a lightweight read
    /// update. A reader already present is a no-op.
    pub async fn mark_read(&self, reader: &str, message_id: &str) -> Result<(), RelayError> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(RelayError::NotFound)?;
        if message.read_by.iter().any(|u| u == reader) {
            return Ok(());
        }

        self.store.append_read(message_id, reader).await?;

        self.rooms.broadcast(
            &message.room_id,
            ServerEvent::MessageReadUpdate {
                message_id: message_id.to_string(),
                user_id: reader.to_string(),
            },
            None,
        );

        Ok(())
    }

    /// Toggle/replace reaction semantics: the same emoji toggles off, a
    /// different emoji replaces the prior one so a user never holds two.
    /// Broadcasts the full updated message with display-ready summaries.
    pub async fn react(
        &self,
        user: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<Message, RelayError> {
        let message = self
            .store
            .message(message_id)
            .await?
            .ok_or(RelayError::NotFound)?;

        let mut reactions = message.reactions.clone();
        match reactions.iter().position(|r| r.user == user) {
            Some(i) if reactions[i].emoji == emoji => {
                reactions.remove(i);
            }
            Some(i) => {
                reactions.remove(i);
                reactions.push(Reaction {
                    user: user.to_string(),
                    emoji: emoji.to_string(),
                    at: Utc::now(),
                });
            }
            None => {
                reactions.push(Reaction {
                    user: user.to_string(),
                    emoji: emoji.to_string(),
                    at: Utc::now(),
                });
            }
        }

        self.store.set_reactions(message_id, &reactions).await?;

        let mut summaries = Vec::with_capacity(reactions.len());
        for reaction in &reactions {
            let user = self
                .store
                .user_summary(&reaction.user)
                .await?
                .unwrap_or_else(|| UserSummary {
                    id: reaction.user.clone(),
                    username: reaction.user.clone(),
                });
            summaries.push(ReactionSummary {
                emoji: reaction.emoji.clone(),
                user,
            });
        }

        let updated = Message {
            reactions,
            ..message
        };
        self.rooms.broadcast(
            &updated.room_id,
            ServerEvent::MessageReaction {
                message: updated.clone(),
                reactions: summaries,
            },
            None,
        );

        Ok(updated)
    }

    /// Ephemeral typing broadcast; never echoed to the sending connection.
    pub fn typing(&self, room_id: &str, sender: &str, sender_connection: Uuid, stop: bool) {
        let event = if stop {
            ServerEvent::StopTyping {
                room_id: room_id.to_string(),
                sender: sender.to_string(),
            }
        } else {
            ServerEvent::Typing {
                room_id: room_id.to_string(),
                sender: sender.to_string(),
            }
        };
        self.rooms.broadcast(room_id, event, Some(sender_connection));
    }
}
