//! Durable storage for messages and channels.
//!
//! The router only depends on the [`DurableStore`] trait; the production
//! implementation is [`SqliteStore`]. Every call is awaited to completion
//! before any broadcast is emitted, so for a single message the broadcast
//! order matches the persistence order.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::models::{Channel, Message, Reaction, UserSummary};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn insert_message(&self, message: &Message) -> Result<()>;

    async fn message(&self, id: &str) -> Result<Option<Message>>;

    /// Replaces the text content and stamps the edit.
    async fn set_content(&self, id: &str, content: &str, edited_at: DateTime<Utc>) -> Result<()>;

    /// Soft delete; the row is kept and only flagged.
    async fn mark_deleted(&self, id: &str) -> Result<()>;

    /// Appends to the read-by set; membership is tested before insert so the
    /// set grows monotonically without duplicates.
    async fn append_read(&self, id: &str, user_id: &str) -> Result<()>;

    /// Replaces the full reaction set atomically.
    async fn set_reactions(&self, id: &str, reactions: &[Reaction]) -> Result<()>;

    /// Room history in creation order; soft-deleted messages are included
    /// flagged so clients can render tombstones.
    async fn messages_in_room(&self, room_id: &str) -> Result<Vec<Message>>;

    async fn insert_channel(&self, channel: &Channel) -> Result<()>;

    async fn list_channels(&self) -> Result<Vec<Channel>>;

    async fn mark_channel_deleted(&self, id: &str) -> Result<()>;

    /// Display-ready user info, if the user exists.
    async fn user_summary(&self, id: &str) -> Result<Option<UserSummary>>;
}
