//! Channel administration handlers.
//!
//! Channel create/delete are the two points where the REST facade pushes
//! out-of-band changes into the real-time core: both fire a
//! `channelsUpdated` broadcast through the Presence Table.

use crate::auth::middleware::Ctx;
use crate::config::AppState;
use crate::error::{Error, Result};
use crate::models::Channel;
use crate::relay::events::ServerEvent;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
}

/// GET /channels
pub async fn list_channels(
    State(state): State<AppState>,
    _ctx: Ctx,
) -> Result<Json<Vec<Channel>>> {
    info!("GET /channels");

    let channels = state.store.list_channels().await?;
    Ok(Json(channels))
}

/// POST /channels
pub async fn create_channel(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(req): Json<CreateChannelRequest>,
) -> Result<Json<Channel>> {
    info!("POST /channels - {}", req.name);

    if req.name.trim().is_empty() {
        return Err(Error::BadRequest("Channel name is required".to_string()));
    }

    let channel = Channel::new(req.name.trim(), ctx.user_id());
    state.store.insert_channel(&channel).await?;

    state.presence.broadcast_all(ServerEvent::ChannelsUpdated);

    Ok(Json(channel))
}

/// DELETE /channels/{channel_id}
pub async fn delete_channel(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(channel_id): Path<String>,
) -> Result<StatusCode> {
    info!("DELETE /channels/{}", channel_id);

    let channels = state.store.list_channels().await?;
    let channel = channels
        .into_iter()
        .find(|c| c.id == channel_id)
        .ok_or_else(|| Error::NotFound("Channel not found".to_string()))?;
    if channel.created_by != ctx.user_id() {
        return Err(Error::Forbidden(
            "Only the channel creator can delete it".to_string(),
        ));
    }

    state.store.mark_channel_deleted(&channel_id).await?;

    state.presence.broadcast_all(ServerEvent::ChannelsUpdated);

    Ok(StatusCode::OK)
}
