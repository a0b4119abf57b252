//! # vefd-server
//!
//! TCP server for vefd.
//!
//! This crate provides:
//! - The accept loop with connection limits and broadcast shutdown
//! - The per-connection state machine (one request/response per socket)
//! - Command dispatch with the bounded empty-queue retry policy
//! - Configuration loading (defaults, YAML file, environment overrides)

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod server;

pub use config::{Config, ConfigError, HeartbeatConfig, NetworkConfig, QueueConfig};
pub use connection::ConnState;
pub use error::ServerError;
pub use handler::{CommandHandler, RetryPolicy};
pub use server::{Server, ServerConfig, ServerStats};
