//! Protocol error types.

use thiserror::Error;

/// Hard protocol-level errors.
///
/// These are not part of the wire error taxonomy: a connection that hits
/// one is torn down without a response frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("content length {size} exceeds limit of {max} bytes")]
    ContentTooLarge { size: u32, max: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
