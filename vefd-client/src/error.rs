//! Client error types.

use thiserror::Error;
use vefd_protocol::{ErrorReason, FrameFault};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] vefd_protocol::ProtocolError),

    #[error("request timeout")]
    Timeout,

    #[error("connection closed before a full response arrived")]
    ConnectionClosed,

    #[error("response checksum mismatch: received {received:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { received: u16, computed: u16 },

    #[error("malformed response frame: {0}")]
    BadFrame(FrameFault),

    #[error("server reported {0}")]
    Server(ErrorReason),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
