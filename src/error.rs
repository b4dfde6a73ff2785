use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

/// Every RPC failure in the system is surfaced to callers with a single
/// status code and a descriptive message; clients dispatch on the message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Specified key not found")]
    KeyNotFound,

    #[error("Server not responsible for the specified key")]
    NotOwner,

    // Delete reports a missing key with this historical message.
    #[error("Server not responsible")]
    NotHeld,

    #[error("Operation failed")]
    ForwardFailed,

    #[error("Exceeded server capacity")]
    ViewCapacity,

    #[error("Server already exists")]
    DuplicateJoin,

    #[error("Server doesn't exist!")]
    UnknownLeave,

    #[error("Server doesn't exist. Move Error!")]
    UnknownMove,

    #[error("Peer unreachable after {0} attempts")]
    PeerUnreachable(u32),

    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Remote error: {0}")]
    RemoteError(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl serde::Serialize for StoreError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        // One status code for everything; the message carries the meaning.
        let status = StatusCode::BAD_REQUEST;

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
