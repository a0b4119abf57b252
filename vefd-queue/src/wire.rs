//! Line-delimited JSON exchanges with monitors and queue nodes.
//!
//! One request object per line, one reply object per line, a fresh
//! connection per exchange.

use crate::error::QueueError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Sends one request line and reads one reply line.
pub async fn exchange<Q, R>(
    addr: SocketAddr,
    timeout: Duration,
    request: &Q,
) -> Result<R, QueueError>
where
    Q: Serialize,
    R: DeserializeOwned,
{
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| QueueError::Timeout)??;
    stream.set_nodelay(true).ok();

    let (read_half, mut write_half) = stream.into_split();

    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    write_half.write_all(&line).await?;

    let mut reader = BufReader::new(read_half);
    let mut reply = String::new();
    let n = tokio::time::timeout(timeout, reader.read_line(&mut reply))
        .await
        .map_err(|_| QueueError::Timeout)??;
    if n == 0 {
        return Err(QueueError::BadReply(
            "connection closed before a reply".to_string(),
        ));
    }

    Ok(serde_json::from_str(reply.trim_end())?)
}
