//! Relay server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::AuthManager;
use crate::relay::{CallSignalRelay, MessageRouter, PresenceTable, RoomMembership};
use crate::store::DurableStore;

/// Configuration for the relay server
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_addr: SocketAddr,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Directory for uploaded files
    pub upload_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let base = std::env::var("RELAY_DATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("relay_data"));
        let port = std::env::var("RELAY_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3001);
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            database_path: base.join("relay.sqlite"),
            upload_dir: base.join("uploads"),
        }
    }
}

impl RelayConfig {
    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.database_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub auth: Arc<AuthManager>,
    pub store: Arc<dyn DurableStore>,
    pub presence: Arc<PresenceTable>,
    pub rooms: Arc<RoomMembership>,
    pub router: Arc<MessageRouter>,
    pub signaling: Arc<CallSignalRelay>,
}
