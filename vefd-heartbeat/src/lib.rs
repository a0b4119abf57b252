//! # vefd-heartbeat
//!
//! Periodic status reporting to the remote monitoring endpoint.
//!
//! This crate provides:
//! - The heartbeat monitor loop (POST, verify, audit, remote commands)
//! - The outbound request envelope built once at startup
//! - The audit sink recording every exchange
//!
//! The payload encryption/signature scheme is not implemented here: it
//! enters through the [`ContentCipher`] seam and the pre-built envelope,
//! and everything this crate touches stays opaque.

pub mod audit;
pub mod envelope;
pub mod error;
pub mod monitor;

pub use audit::{AuditRecord, AuditSink, JsonlAuditSink};
pub use envelope::{ContentCipher, DeviceReport, HeartbeatRequest, PlainCipher};
pub use error::HeartbeatError;
pub use monitor::{HeartbeatMonitor, HeartbeatStats, RemoteCommand};
