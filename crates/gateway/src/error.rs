//! HTTP error taxonomy.
//!
//! Every failure a handler can produce maps to a stable JSON error body
//! here; internal detail is logged server-side and never leaks to the
//! client.

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
    thiserror::Error,
    tracing::error,
};

use {wagate_protocol::AdapterError, wagate_sessions::RegistryError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("session is not connected")]
    SessionNotConnected,
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotConnected => Self::SessionNotConnected,
            RegistryError::Adapter(AdapterError::InvalidKey(key)) => {
                Self::Validation(format!("invalid session key: {key}"))
            },
            RegistryError::Adapter(AdapterError::SendFailed(msg)) => Self::SendFailed(msg),
            RegistryError::Adapter(e) => Self::Internal(anyhow::Error::new(e)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            Self::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
            },
            Self::SessionNotConnected => {
                (StatusCode::CONFLICT, "session_not_connected", None)
            },
            Self::SendFailed(msg) => {
                error!(error = %msg, "send failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "send_failed", None)
            },
            Self::Internal(e) => {
                // Full detail stays server-side.
                error!(error = ?e, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_server_error", None)
            },
        };
        let mut body = json!({ "error": code });
        if let Some(message) = message {
            body["message"] = json!(message);
        }
        (status, Json(body)).into_response()
    }
}
