//! SQLite-backed durable store.
//!
//! Messages and channels live in two tables; the grow-only sets and the
//! reaction set are stored as JSON columns since the relay only ever reads
//! them whole.

use super::DurableStore;
use crate::models::{Channel, Message, MessageKind, Reaction, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

pub struct SqliteStore {
    pool: SqlitePool,
}

type MessageRow = (
    String,         // id
    String,         // room_id
    String,         // author
    String,         // kind JSON
    String,         // created_at
    i64,            // edited
    Option<String>, // edited_at
    i64,            // deleted
    String,         // delivered_to JSON
    String,         // read_by JSON
    String,         // reactions JSON
);

const MESSAGE_COLUMNS: &str = "id, room_id, author, kind, created_at, edited, edited_at, deleted, delivered_to, read_by, reactions";

impl SqliteStore {
    /// Creates the store over an existing pool and ensures the schema.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                author TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL,
                edited INTEGER NOT NULL DEFAULT 0,
                edited_at TEXT,
                deleted INTEGER NOT NULL DEFAULT 0,
                delivered_to TEXT NOT NULL DEFAULT '[]',
                read_by TEXT NOT NULL DEFAULT '[]',
                reactions TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("[Store] Schema ready");

        Ok(Self { pool })
    }

    fn row_to_message(row: MessageRow) -> Result<Message> {
        let (
            id,
            room_id,
            author,
            kind,
            created_at,
            edited,
            edited_at,
            deleted,
            delivered_to,
            read_by,
            reactions,
        ) = row;

        let kind: MessageKind =
            serde_json::from_str(&kind).context("Failed to parse message kind")?;

        Ok(Message {
            id,
            room_id,
            author,
            kind,
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            edited: edited != 0,
            edited_at: edited_at.and_then(|t| t.parse().ok()),
            deleted: deleted != 0,
            delivered_to: serde_json::from_str(&delivered_to).unwrap_or_default(),
            read_by: serde_json::from_str(&read_by).unwrap_or_default(),
            reactions: serde_json::from_str(&reactions).unwrap_or_default(),
        })
    }

}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn insert_message(&self, message: &Message) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (id, room_id, author, kind, created_at, edited, edited_at, deleted, delivered_to, read_by, reactions) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.room_id)
        .bind(&message.author)
        .bind(serde_json::to_string(&message.kind)?)
        .bind(message.created_at.to_rfc3339())
        .bind(message.edited as i64)
        .bind(message.edited_at.map(|t| t.to_rfc3339()))
        .bind(message.deleted as i64)
        .bind(serde_json::to_string(&message.delivered_to)?)
        .bind(serde_json::to_string(&message.read_by)?)
        .bind(serde_json::to_string(&message.reactions)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn message(&self, id: &str) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE id = ?",
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_message).transpose()
    }

    async fn set_content(&self, id: &str, content: &str, edited_at: DateTime<Utc>) -> Result<()> {
        let kind = MessageKind::Text {
            content: content.to_string(),
        };
        sqlx::query("UPDATE messages SET kind = ?, edited = 1, edited_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&kind)?)
            .bind(edited_at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_deleted(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn append_read(&self, id: &str, user_id: &str) -> Result<()> {
        let row: Option<(String,)> = sqlx::query_as("SELECT read_by FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let (raw,) = row.context("Message not found")?;
        let mut set: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
        if set.iter().any(|u| u == user_id) {
            return Ok(());
        }
        set.push(user_id.to_string());

        sqlx::query("UPDATE messages SET read_by = ? WHERE id = ?")
            .bind(serde_json::to_string(&set)?)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_reactions(&self, id: &str, reactions: &[Reaction]) -> Result<()> {
        sqlx::query("UPDATE messages SET reactions = ? WHERE id = ?")
            .bind(serde_json::to_string(reactions)?)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn messages_in_room(&self, room_id: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE room_id = ? ORDER BY created_at",
            MESSAGE_COLUMNS
        ))
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_message).collect()
    }

    async fn insert_channel(&self, channel: &Channel) -> Result<()> {
        sqlx::query(
            "INSERT INTO channels (id, name, created_by, created_at, deleted) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&channel.id)
        .bind(&channel.name)
        .bind(&channel.created_by)
        .bind(channel.created_at.to_rfc3339())
        .bind(channel.deleted as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, name, created_by, created_at FROM channels WHERE deleted = 0 ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, created_by, created_at)| Channel {
                id,
                name,
                created_by,
                created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
                deleted: false,
            })
            .collect())
    }

    async fn mark_channel_deleted(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE channels SET deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn user_summary(&self, id: &str) -> Result<Option<UserSummary>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, username FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, username)| UserSummary { id, username }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteStore::new(pool).await.unwrap()
    }

    fn text_message(room: &str, author: &str, content: &str) -> Message {
        Message::new(
            room,
            author,
            MessageKind::Text {
                content: content.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trips_kind() {
        let store = memory_store().await;
        let msg = Message::new(
            "general",
            "alice",
            MessageKind::File {
                url: "/uploads/abc".to_string(),
                name: "notes.pdf".to_string(),
                size: 1024,
                mime: "application/pdf".to_string(),
            },
        );
        store.insert_message(&msg).await.unwrap();

        let loaded = store.message(&msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.author, "alice");
        assert!(matches!(loaded.kind, MessageKind::File { size: 1024, .. }));
        assert!(store.message("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_set_is_monotonic_and_deduplicated() {
        let store = memory_store().await;
        let mut msg = text_message("general", "alice", "hi");
        msg.delivered_to.push("bob".to_string());
        store.insert_message(&msg).await.unwrap();

        store.append_read(&msg.id, "bob").await.unwrap();
        store.append_read(&msg.id, "bob").await.unwrap();
        store.append_read(&msg.id, "carol").await.unwrap();

        let loaded = store.message(&msg.id).await.unwrap().unwrap();
        assert_eq!(loaded.read_by, vec!["bob", "carol"]);
        // delivered flag is fixed at insert time and survives the updates
        assert_eq!(loaded.delivered_to, vec!["bob"]);
    }

    #[tokio::test]
    async fn soft_delete_keeps_row_flagged() {
        let store = memory_store().await;
        let msg = text_message("general", "alice", "oops");
        store.insert_message(&msg).await.unwrap();

        store.mark_deleted(&msg.id).await.unwrap();

        let loaded = store.message(&msg.id).await.unwrap().unwrap();
        assert!(loaded.deleted);
        // history still returns the flagged row
        let history = store.messages_in_room("general").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].deleted);
    }

    #[tokio::test]
    async fn deleted_channels_drop_out_of_listing() {
        let store = memory_store().await;
        let ch = Channel::new("general", "alice");
        store.insert_channel(&ch).await.unwrap();
        assert_eq!(store.list_channels().await.unwrap().len(), 1);

        store.mark_channel_deleted(&ch.id).await.unwrap();
        assert!(store.list_channels().await.unwrap().is_empty());
    }
}
