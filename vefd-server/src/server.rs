//! TCP server implementation.

use crate::connection;
use crate::error::ServerError;
use crate::handler::CommandHandler;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Per-connection read buffer size.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", vefd_protocol::DEFAULT_PORT)
                .parse()
                .unwrap(),
            max_connections: 1000,
            read_buffer_size: 8192,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for vefd.
///
/// One spawned task per connection; a fault inside a connection is counted
/// and logged but never reaches the accept loop or other connections. On
/// shutdown the listener stops accepting and in-flight exchanges drain
/// naturally (they are single-frame and short-lived).
pub struct Server {
    config: ServerConfig,
    handler: Arc<CommandHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, handler: CommandHandler) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.running.store(true, Ordering::SeqCst);

        tracing::info!("Server listening on {}", self.config.bind_addr);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn accept(&self, mut stream: tokio::net::TcpStream, addr: SocketAddr) {
        if self.stats.connections_active.load(Ordering::Relaxed)
            >= self.config.max_connections as u64
        {
            tracing::warn!("Connection limit reached, rejecting {}", addr);
            return;
        }

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

        let handler = self.handler.clone();
        let stats = self.stats.clone();
        let read_buffer_size = self.config.read_buffer_size;

        tokio::spawn(async move {
            tracing::info!("Device connected: {}", addr);
            stream.set_nodelay(true).ok();

            match connection::serve(&mut stream, addr, &handler, read_buffer_size).await {
                Ok(()) => {
                    stats.requests_total.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::debug!("[{}] connection error: {}", addr, e);
                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                }
            }

            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            tracing::info!("Device disconnected: {}", addr);
        });
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vefd_queue::{QueueError, WorkItem, WorkQueue};

    struct StubQueue;

    #[async_trait]
    impl WorkQueue for StubQueue {
        async fn pop(&self) -> Result<Option<WorkItem>, QueueError> {
            Ok(Some(WorkItem("INV001_1".to_string())))
        }

        async fn replenish(&self) -> Result<(), QueueError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_server_not_running_before_run() {
        let handler = CommandHandler::new(Arc::new(StubQueue));
        let server = Server::new(ServerConfig::new("127.0.0.1:0".parse().unwrap()), handler);
        assert!(!server.is_running());
        assert_eq!(server.stats().connections_total.load(Ordering::Relaxed), 0);
    }
}
