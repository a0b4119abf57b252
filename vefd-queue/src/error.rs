//! Queue client error types.

use thiserror::Error;

/// Errors from the work-queue client.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no monitor reported a writable primary")]
    NoPrimary,

    #[error("connect timeout")]
    Timeout,

    #[error("unexpected reply from queue service: {0}")]
    BadReply(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    /// Whether the failure indicates the peer itself is unreachable, as
    /// opposed to answering wrongly.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, QueueError::Io(_) | QueueError::Timeout)
    }
}
