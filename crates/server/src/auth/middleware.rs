//! Bearer-token middleware for the REST facade.

use crate::config::AppState;
use crate::error::{Error, Result};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Identity of the authenticated caller, injected into request extensions.
#[derive(Clone, Debug)]
pub struct Ctx {
    user_id: String,
    username: String,
}

impl Ctx {
    pub fn new(user_id: String, username: String) -> Self {
        Self { user_id, username }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Ctx>()
            .cloned()
            .ok_or(Error::AuthFailCtxNotInRequestExt)
    }
}

pub async fn mw_require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    debug!("MIDDLEWARE: require_auth");

    let auth_header = req.headers().get(header::AUTHORIZATION);
    let auth_header = match auth_header {
        Some(h) => h.to_str().map_err(|_| Error::AuthFailTokenWrongFormat)?,
        None => return Err(Error::AuthFailNoToken),
    };

    // Format: "Bearer <token>"
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(Error::AuthFailTokenWrongFormat)?;

    let user_info = state
        .auth
        .validate_session(token)
        .await
        .map_err(|_| Error::LoginFail)?;

    req.extensions_mut()
        .insert(Ctx::new(user_info.id, user_info.username));

    Ok(next.run(req).await)
}
