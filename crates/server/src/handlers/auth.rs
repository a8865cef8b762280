//! Auth handlers

use crate::auth::middleware::Ctx;
use crate::auth::UserInfo;
use crate::config::AppState;
use crate::error::{Error, Result};
use crate::relay::events::ServerEvent;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<AuthResponse>> {
    info!("POST /auth/signup - {}", req.email);

    let user = state
        .auth
        .signup(req.email.clone(), req.username, req.password.clone())
        .await
        .map_err(|e| {
            warn!("Signup failed for {}: {}", req.email, e);
            Error::BadRequest(e.to_string())
        })?;

    let (_, session) = state
        .auth
        .login(req.email, req.password)
        .await
        .map_err(|e| {
            warn!("Login after signup failed: {}", e);
            Error::Internal("Account created but login failed".to_string())
        })?;

    // let connected clients refresh their contact lists
    state.presence.broadcast_all(ServerEvent::UsersUpdated);

    Ok(Json(AuthResponse {
        token: session.token,
        user_id: user.id,
        username: user.username,
    }))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    info!("POST /auth/login - {}", req.email);

    let (user, session) = state.auth.login(req.email.clone(), req.password).await.map_err(|e| {
        warn!("Login failed for {}: {}", req.email, e);
        Error::LoginFail
    })?;

    Ok(Json(AuthResponse {
        token: session.token,
        user_id: user.id,
        username: user.username,
    }))
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    info!("POST /auth/logout");

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(Error::AuthFailNoToken)?;

    state.auth.logout(token).await?;
    Ok(StatusCode::OK)
}

/// GET /auth/me
pub async fn me(State(state): State<AppState>, ctx: Ctx) -> Result<Json<UserInfo>> {
    info!("GET /auth/me - {}", ctx.user_id());

    let user = state
        .auth
        .get_user(ctx.user_id())
        .await
        .map_err(|e| Error::NotFound(e.to_string()))?;
    Ok(Json(user))
}

/// GET /users
pub async fn list_users(State(state): State<AppState>, _ctx: Ctx) -> Result<Json<Vec<UserInfo>>> {
    info!("GET /users");

    let users = state.auth.list_users().await?;
    Ok(Json(users))
}
