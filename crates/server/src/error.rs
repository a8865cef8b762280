use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors produced by the real-time core. Each maps to exactly one
/// client-visible failure; `Store` is reported generically and never
/// exposes storage internals.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),

    #[error("message not found")]
    NotFound,

    #[error("not allowed")]
    Forbidden,

    #[error("User is offline")]
    PeerOffline,

    #[error("storage failure")]
    Store(#[from] anyhow::Error),
}

/// HTTP-boundary error for the REST facade.
#[derive(Debug)]
pub enum Error {
    // Auth errors
    LoginFail,
    AuthFailNoToken,
    AuthFailTokenWrongFormat,
    AuthFailCtxNotInRequestExt,

    // Generic
    BadRequest(String),
    NotFound(String),
    Forbidden(String),
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Error::LoginFail => (StatusCode::UNAUTHORIZED, "Login failed".to_string()),
            Error::AuthFailNoToken => (StatusCode::UNAUTHORIZED, "No auth token found".to_string()),
            Error::AuthFailTokenWrongFormat => (
                StatusCode::UNAUTHORIZED,
                "Auth token wrong format".to_string(),
            ),
            Error::AuthFailCtxNotInRequestExt => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Auth context missing".to_string(),
            ),
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Error::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": {
                "message": error_message
            }
        }));

        (status, body).into_response()
    }
}

// Allow conversion from other errors (e.g., anyhow, sqlx) easiest via string
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<RelayError> for Error {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Validation(msg) => Error::BadRequest(msg),
            RelayError::NotFound => Error::NotFound("Message not found".to_string()),
            RelayError::Forbidden => Error::Forbidden("Not allowed".to_string()),
            RelayError::PeerOffline => Error::BadRequest("User is offline".to_string()),
            // Internals stay in the server log only.
            RelayError::Store(_) => Error::Internal("Storage failure".to_string()),
        }
    }
}
