//! Head-of-queue access against the replicated backend.

use crate::directory::MonitorDirectory;
use crate::error::QueueError;
use crate::wire;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::Mutex;

/// One queue entry: an invoice assignment of the form `code_number`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem(pub String);

impl WorkItem {
    /// Splits on the first `_` into `(code, number)`.
    pub fn parts(&self) -> Option<(&str, &str)> {
        self.0.split_once('_')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The two-operation queue accessor.
///
/// Implementations perform no retries and no sleeping; the empty-queue
/// policy is owned by the caller. The backend guarantees atomic pop
/// semantics, so any number of connections may call this concurrently.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Pops the next item, or `None` when the queue is empty.
    async fn pop(&self) -> Result<Option<WorkItem>, QueueError>;

    /// Triggers the out-of-band refill on the backend.
    async fn replenish(&self) -> Result<(), QueueError>;
}

#[derive(Debug, Serialize)]
struct QueueCommand<'a> {
    op: &'static str,
    queue: &'a str,
}

#[derive(Debug, Deserialize)]
struct PopReply {
    item: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplenishReply {
    ok: bool,
}

/// `WorkQueue` backed by the replicated queue service.
///
/// The resolved primary is cached; any connectivity failure clears the
/// cache and re-resolves through the directory before one retry.
pub struct ReplicatedQueue {
    directory: MonitorDirectory,
    queue: String,
    connect_timeout: Duration,
    primary: Mutex<Option<SocketAddr>>,
}

impl ReplicatedQueue {
    pub fn new(directory: MonitorDirectory, queue: impl Into<String>) -> Self {
        Self {
            directory,
            queue: queue.into(),
            connect_timeout: Duration::from_millis(500),
            primary: Mutex::new(None),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn current_primary(&self) -> Result<SocketAddr, QueueError> {
        let mut primary = self.primary.lock().await;
        if let Some(addr) = *primary {
            return Ok(addr);
        }
        let resolved = self.directory.resolve_primary().await?;
        *primary = Some(resolved);
        Ok(resolved)
    }

    async fn invalidate(&self, failed: SocketAddr) {
        let mut primary = self.primary.lock().await;
        if *primary == Some(failed) {
            *primary = None;
        }
    }

    /// Runs one exchange against the primary, re-resolving once after a
    /// connectivity failure.
    async fn with_primary<R>(&self, command: &QueueCommand<'_>) -> Result<R, QueueError>
    where
        R: DeserializeOwned,
    {
        let addr = self.current_primary().await?;
        match wire::exchange(addr, self.connect_timeout, command).await {
            Ok(reply) => Ok(reply),
            Err(e) if e.is_connectivity() => {
                tracing::warn!("queue primary {} unreachable ({}), re-resolving", addr, e);
                self.invalidate(addr).await;
                let addr = self.current_primary().await?;
                wire::exchange(addr, self.connect_timeout, command).await
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl WorkQueue for ReplicatedQueue {
    async fn pop(&self) -> Result<Option<WorkItem>, QueueError> {
        let command = QueueCommand {
            op: "POP",
            queue: &self.queue,
        };
        let reply: PopReply = self.with_primary(&command).await?;
        Ok(reply.item.map(WorkItem))
    }

    async fn replenish(&self) -> Result<(), QueueError> {
        let command = QueueCommand {
            op: "REPLENISH",
            queue: &self.queue,
        };
        let reply: ReplenishReply = self.with_primary(&command).await?;
        if !reply.ok {
            return Err(QueueError::BadReply("replenish rejected".to_string()));
        }
        Ok(())
    }
}
