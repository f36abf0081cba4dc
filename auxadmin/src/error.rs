//! Error taxonomy for the admin surface.
//!
//! Every fallible operation in the store and the HTTP layer surfaces one of
//! these variants; the axum integration maps them onto status codes and a
//! `{ "error": ... }` JSON body. Internal failures are logged server-side
//! and kept opaque to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    /// Missing or malformed fields in the request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Bad password or missing/invalid session cookie.
    #[error("unauthorized")]
    Unauthorized,

    /// Unknown session or message.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unexpected failure in the store or elsewhere.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AdminError {
    /// HTTP status code this error maps to.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for AdminError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Internal(error.into())
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(error) => {
                tracing::error!(%error, "internal error serving admin request");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
