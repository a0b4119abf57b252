//! Primary resolution through the monitor directory.
//!
//! The queue is replicated; a small set of monitor endpoints elects and
//! reports the currently writable primary. Clients never hold a fixed
//! queue address.

use crate::error::QueueError;
use crate::wire;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct PrimaryQuery<'a> {
    op: &'static str,
    service: &'a str,
}

#[derive(Debug, Deserialize)]
struct PrimaryReply {
    addr: Option<String>,
}

/// The set of monitor endpoints for one queue service.
#[derive(Debug, Clone)]
pub struct MonitorDirectory {
    monitors: Vec<SocketAddr>,
    service: String,
    connect_timeout: Duration,
}

impl MonitorDirectory {
    pub fn new(monitors: Vec<SocketAddr>, service: impl Into<String>) -> Self {
        Self {
            monitors,
            service: service.into(),
            connect_timeout: Duration::from_millis(500),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Asks each monitor in order for the current primary; the first
    /// definite answer wins.
    pub async fn resolve_primary(&self) -> Result<SocketAddr, QueueError> {
        for &monitor in &self.monitors {
            let query = PrimaryQuery {
                op: "PRIMARY",
                service: &self.service,
            };
            match wire::exchange::<_, PrimaryReply>(monitor, self.connect_timeout, &query).await {
                Ok(PrimaryReply { addr: Some(addr) }) => match addr.parse() {
                    Ok(primary) => {
                        tracing::debug!("monitor {} reports primary {}", monitor, primary);
                        return Ok(primary);
                    }
                    Err(_) => {
                        tracing::warn!(
                            "monitor {} returned unparseable primary address {:?}",
                            monitor,
                            addr
                        );
                    }
                },
                Ok(PrimaryReply { addr: None }) => {
                    tracing::warn!("monitor {} has no elected primary", monitor);
                }
                Err(e) => {
                    tracing::warn!("monitor {} unreachable: {}", monitor, e);
                }
            }
        }
        Err(QueueError::NoPrimary)
    }
}
