//! # vefd-queue
//!
//! Client for the replicated invoice work queue.
//!
//! This crate provides:
//! - `WorkQueue`, the two-operation accessor trait (pop / replenish)
//! - Primary resolution through a monitor directory with failover
//! - Line-delimited JSON exchanges with monitors and queue nodes
//!
//! The accessor is deliberately thin: it never retries an empty queue and
//! never sleeps. The empty-queue policy belongs to the caller.

pub mod directory;
pub mod error;
pub mod queue;
pub(crate) mod wire;

pub use directory::MonitorDirectory;
pub use error::QueueError;
pub use queue::{ReplicatedQueue, WorkItem, WorkQueue};
