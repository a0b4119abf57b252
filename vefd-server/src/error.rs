//! Server error types.

use thiserror::Error;

/// Server errors.
///
/// None of these reach a peer: protocol-level faults are answered with an
/// ERROR frame before they ever become a `ServerError`, and transport
/// faults simply end the connection.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] vefd_protocol::ProtocolError),
}
