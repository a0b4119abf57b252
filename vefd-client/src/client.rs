//! One-shot device-side exchanges.

use crate::error::ClientError;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use vefd_protocol::codec::{Decoder, Inbound};
use vefd_protocol::frame::{Command, Frame};
use vefd_protocol::message::{ErrorReport, InvoiceAssignment, StatusReport};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for the full request/response exchange.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ClientConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}

/// A decoded response frame.
#[derive(Debug)]
pub struct ResponseFrame {
    pub command: Command,
    pub payload: Bytes,
}

/// A client for the vefd server.
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Performs one request/response exchange on a fresh connection.
    ///
    /// An ERROR response surfaces as [`ClientError::Server`].
    pub async fn exchange(
        &self,
        command: Command,
        payload: Bytes,
    ) -> Result<ResponseFrame, ClientError> {
        let encoded = Frame::new(command, payload).encode()?;

        tracing::debug!("Connecting to {}...", self.config.addr);
        let mut stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;
        stream.set_nodelay(true).ok();

        stream.write_all(&encoded).await?;
        tracing::debug!("Request sent ({} bytes), waiting for response...", encoded.len());

        let reply = tokio::time::timeout(
            self.config.request_timeout,
            Self::read_response(&mut stream, self.config.read_buffer_size),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;

        match reply {
            Inbound::Request {
                command: Command::Error,
                payload,
                ..
            } => {
                let report: ErrorReport = serde_json::from_slice(&payload)?;
                Err(ClientError::Server(report.error))
            }
            Inbound::Request {
                command, payload, ..
            } => Ok(ResponseFrame { command, payload }),
            Inbound::ChecksumFault {
                received, computed, ..
            } => Err(ClientError::ChecksumMismatch { received, computed }),
            Inbound::FramingFault(fault) => Err(ClientError::BadFrame(fault)),
        }
    }

    /// Reads until one complete response frame has been assembled.
    async fn read_response(
        stream: &mut TcpStream,
        read_buffer_size: usize,
    ) -> Result<Inbound, ClientError> {
        let mut decoder = Decoder::new();
        let mut buf = vec![0u8; read_buffer_size];

        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            decoder.feed(&buf[..n]);
            if let Some(inbound) = decoder.poll_response()? {
                return Ok(inbound);
            }
        }
    }

    /// Checks whether the server is online.
    pub async fn status(&self) -> Result<StatusReport, ClientError> {
        let reply = self.exchange(Command::Status, Bytes::new()).await?;
        Ok(serde_json::from_slice(&reply.payload)?)
    }

    /// Requests the next invoice assignment.
    pub async fn fetch_assignment(&self) -> Result<InvoiceAssignment, ClientError> {
        let reply = self.exchange(Command::Data, Bytes::new()).await?;
        Ok(serde_json::from_slice(&reply.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use vefd_protocol::message::ErrorReason;
    use vefd_protocol::{Decoder as ServerDecoder, Inbound as ServerInbound};

    /// Accepts one connection, decodes the request, answers with the
    /// given frame, closes.
    async fn spawn_responder(response: Frame) -> (SocketAddr, tokio::task::JoinHandle<Command>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut decoder = ServerDecoder::new();
            let mut buf = [0u8; 1024];
            let request = loop {
                let n = stream.read(&mut buf).await.unwrap();
                assert_ne!(n, 0);
                decoder.feed(&buf[..n]);
                if let Some(inbound) = decoder.poll().unwrap() {
                    break inbound;
                }
            };
            let command = match request {
                ServerInbound::Request { command, .. } => command,
                other => panic!("unexpected request: {:?}", other),
            };
            let encoded = response.encode().unwrap();
            stream.write_all(&encoded).await.unwrap();
            command
        });
        (addr, handle)
    }

    fn fast_client(addr: SocketAddr) -> Client {
        Client::new(
            ClientConfig::new(addr)
                .with_connect_timeout(Duration::from_secs(1))
                .with_request_timeout(Duration::from_secs(1)),
        )
    }

    #[tokio::test]
    async fn test_status_exchange() {
        let response = Frame::from_json(Command::Status, &StatusReport::online()).unwrap();
        let (addr, server) = spawn_responder(response).await;

        let report = fast_client(addr).status().await.unwrap();
        assert_eq!(report, StatusReport::online());
        assert_eq!(server.await.unwrap(), Command::Status);
    }

    #[tokio::test]
    async fn test_fetch_assignment() {
        let assignment = InvoiceAssignment::from_work_item("INV001_4432").unwrap();
        let response = Frame::from_json(Command::Data, &assignment).unwrap();
        let (addr, server) = spawn_responder(response).await;

        let fetched = fast_client(addr).fetch_assignment().await.unwrap();
        assert_eq!(fetched, assignment);
        assert_eq!(server.await.unwrap(), Command::Data);
    }

    #[tokio::test]
    async fn test_error_response_surfaces() {
        let response =
            Frame::from_json(Command::Error, &ErrorReport::new(ErrorReason::QueueUnavailable))
                .unwrap();
        let (addr, _server) = spawn_responder(response).await;

        let result = fast_client(addr).fetch_assignment().await;
        assert!(matches!(
            result,
            Err(ClientError::Server(ErrorReason::QueueUnavailable))
        ));
    }

    #[tokio::test]
    async fn test_server_closing_early_is_connection_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // Drain the request so the close is a clean FIN, then hang up
            // without answering.
            let mut decoder = ServerDecoder::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                assert_ne!(n, 0);
                decoder.feed(&buf[..n]);
                if decoder.poll().unwrap().is_some() {
                    break;
                }
            }
        });

        let result = fast_client(addr).status().await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }
}
