//! Heartbeat error types.

use thiserror::Error;

/// Heartbeat errors.
///
/// All of these are logged and counted; none of them stops the monitor
/// loop.
#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response signature mismatch, decryption aborted")]
    SignatureMismatch,

    #[error("malformed monitoring response: {0}")]
    MalformedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
