//! Per-connection session handling.
//!
//! The protocol is one exchange per connection: a device sends a single
//! frame, receives a single frame, and the socket is closed. Frames are
//! processed strictly in the order header, body, dispatch, write.

use crate::error::ServerError;
use crate::handler::CommandHandler;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use vefd_protocol::codec::Decoder;

/// Connection lifecycle states.
///
/// `AwaitingHeader` and `AwaitingBody` are tracked by the frame decoder;
/// the session function carries the connection through the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    AwaitingHeader,
    AwaitingBody,
    Dispatching,
    Draining,
    Closed,
}

/// Drives one connection: assemble a single request, dispatch it, drain
/// the response, close.
///
/// A transport-level failure tears the connection down without a response;
/// the error is returned for accounting only and never reaches a peer.
pub async fn serve<S>(
    stream: &mut S,
    addr: SocketAddr,
    handler: &CommandHandler,
    read_buffer_size: usize,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut decoder = Decoder::new();
    let mut buf = vec![0u8; read_buffer_size];
    let mut state = ConnState::AwaitingHeader;

    let inbound = loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            tracing::debug!("[{}] peer closed before a full frame arrived", addr);
            return Ok(());
        }
        tracing::debug!("[{}] read {} bytes", addr, n);
        decoder.feed(&buf[..n]);

        match decoder.poll()? {
            Some(inbound) => break inbound,
            None => {
                let next = if decoder.awaiting_body() {
                    ConnState::AwaitingBody
                } else {
                    ConnState::AwaitingHeader
                };
                if next != state {
                    state = next;
                    tracing::debug!("[{}] -> {:?}", addr, state);
                }
            }
        }
    };

    state = ConnState::Dispatching;
    tracing::debug!("[{}] -> {:?}", addr, state);
    let response = handler.respond(inbound).await?;
    let encoded = response.encode()?;

    state = ConnState::Draining;
    tracing::debug!("[{}] -> {:?} ({} bytes)", addr, state, encoded.len());
    stream.write_all(&encoded).await?;
    stream.flush().await?;

    state = ConnState::Closed;
    tracing::debug!("[{}] -> {:?}", addr, state);
    Ok(())
}
