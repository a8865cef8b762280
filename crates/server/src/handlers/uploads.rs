//! File/image uploads for chat attachments.
//!
//! Content is stored on disk under its SHA-256 hash with a JSON metadata
//! sidecar; the returned URL is what clients put into `fileMessage` and
//! image `chatMessage` events.

use crate::auth::middleware::Ctx;
use crate::config::AppState;
use crate::error::{Error, Result};
use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info};

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadMeta {
    pub name: String,
    pub mime: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub url: String,
    pub name: String,
    pub mime: String,
    pub size: u64,
}

/// POST /uploads
pub async fn upload(
    State(state): State<AppState>,
    _ctx: Ctx,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    info!("POST /uploads");

    let mut filename = None;
    let mut content_type = None;
    let mut data = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error!("Failed to read multipart field: {}", e);
        Error::BadRequest("Malformed upload".to_string())
    })? {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            content_type = field.content_type().map(|s| s.to_string());
            data = Some(field.bytes().await.map_err(|e| {
                error!("Failed to read file data: {}", e);
                Error::BadRequest("Malformed upload".to_string())
            })?);
        }
    }

    let data = data.ok_or_else(|| Error::BadRequest("Missing file field".to_string()))?;
    let name = filename.unwrap_or_else(|| "unnamed".to_string());
    let mime = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    let mut hasher = Sha256::new();
    hasher.update(&data);
    let id = format!("{:x}", hasher.finalize());

    let meta = UploadMeta {
        name: name.clone(),
        mime: mime.clone(),
        size: data.len() as u64,
    };

    let path = state.config.upload_dir.join(&id);
    let meta_path = state.config.upload_dir.join(format!("{}.meta.json", id));
    tokio::fs::write(&path, &data)
        .await
        .map_err(|e| Error::Internal(format!("Failed to store upload: {}", e)))?;
    tokio::fs::write(&meta_path, serde_json::to_vec(&meta).unwrap_or_default())
        .await
        .map_err(|e| Error::Internal(format!("Failed to store upload: {}", e)))?;

    info!("Stored upload {} ({} bytes)", id, meta.size);

    Ok(Json(UploadResponse {
        url: format!("/uploads/{}", id),
        id,
        name,
        mime,
        size: meta.size,
    }))
}

/// GET /uploads/{id}
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(HeaderMap, axum::body::Bytes)> {
    info!("GET /uploads/{}", id);

    // hashes are lowercase hex, anything else is a traversal attempt
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::BadRequest("Invalid upload id".to_string()));
    }

    let path = state.config.upload_dir.join(&id);
    let data = tokio::fs::read(&path)
        .await
        .map_err(|_| Error::NotFound("Upload not found".to_string()))?;

    let meta_path = state.config.upload_dir.join(format!("{}.meta.json", id));
    let mime = match tokio::fs::read(&meta_path).await {
        Ok(raw) => serde_json::from_slice::<UploadMeta>(&raw)
            .map(|m| m.mime)
            .unwrap_or_else(|_| "application/octet-stream".to_string()),
        Err(_) => "application/octet-stream".to_string(),
    };

    let mut headers = HeaderMap::new();
    if let Ok(value) = mime.parse() {
        headers.insert(http::header::CONTENT_TYPE, value);
    }

    Ok((headers, axum::body::Bytes::from(data)))
}
