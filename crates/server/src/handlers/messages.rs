//! Message history retrieval.
//!
//! Closes the known real-time gap: a message persisted while its recipients
//! were offline (or missed between persist and broadcast) is still reachable
//! here. Soft-deleted messages come back flagged so clients can render
//! tombstones.

use crate::auth::middleware::Ctx;
use crate::config::AppState;
use crate::error::Result;
use crate::models::Message;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

/// GET /rooms/{room_id}/messages
pub async fn room_history(
    State(state): State<AppState>,
    _ctx: Ctx,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Message>>> {
    info!("GET /rooms/{}/messages", room_id);

    let messages = state.store.messages_in_room(&room_id).await?;
    Ok(Json(messages))
}
