//! Real-time messaging relay.
//!
//! Accepts persistent WebSocket connections, tracks who is online and which
//! connections belong to them, routes chat events to the right recipients,
//! and relays call signaling between two peers. A thin REST facade covers
//! auth, channel administration, uploads, and history retrieval.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod relay;
pub mod store;

use axum::{middleware, routing::get, routing::post, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::middleware::mw_require_auth;
use auth::AuthManager;
use config::{AppState, RelayConfig};
use handlers::{
    create_channel, delete_channel, download, list_channels, list_users, login, logout, me,
    room_history, signup, upload,
};
use relay::{ws_handler, CallSignalRelay, MessageRouter, PresenceTable, RoomMembership};
use store::SqliteStore;

pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    info!("=== Messaging Relay ===");

    let config = RelayConfig::default();
    config.ensure_dirs().await?;

    info!("Database: {:?}", config.database_path);
    info!("Uploads: {:?}", config.upload_dir);

    let pool = SqlitePoolOptions::new()
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .create_if_missing(true),
        )
        .await?;

    let auth = Arc::new(AuthManager::new(pool.clone()).await?);
    info!("Auth Manager initialized");

    let store = Arc::new(SqliteStore::new(pool).await?);
    info!("Durable store initialized");

    let presence = Arc::new(PresenceTable::new());
    let rooms = Arc::new(RoomMembership::new());
    let router = Arc::new(MessageRouter::new(
        store.clone() as Arc<dyn store::DurableStore>,
        presence.clone(),
        rooms.clone(),
    ));
    let signaling = Arc::new(CallSignalRelay::new(presence.clone()));
    info!("Relay core initialized");

    let app_state = AppState {
        config: config.clone(),
        auth,
        store,
        presence,
        rooms,
        router,
        signaling,
    };

    let protected = Router::new()
        .route("/auth/me", get(me))
        .route("/users", get(list_users))
        .route("/channels", get(list_channels).post(create_channel))
        .route("/channels/{channel_id}", axum::routing::delete(delete_channel))
        .route("/rooms/{room_id}/messages", get(room_history))
        .route("/uploads", post(upload))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            mw_require_auth,
        ));

    let app = Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/uploads/{id}", get(download))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .merge(protected)
        .with_state(app_state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http());

    info!("Listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - Messaging Relay"
}
