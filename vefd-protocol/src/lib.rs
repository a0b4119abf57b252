//! # vefd-protocol
//!
//! Wire protocol implementation for vefd (the ESD frame protocol).
//!
//! This crate provides:
//! - Fixed-header binary framing with a CRC-16 integrity trailer
//! - Incremental frame assembly tolerant of partial socket reads
//! - JSON payload documents (status report, invoice assignment, error)
//! - Error taxonomy and protocol constants

pub mod checksum;
pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use checksum::checksum;
pub use codec::{Decoder, Inbound};
pub use error::ProtocolError;
pub use frame::{
    decode_body, Command, Frame, FrameFault, Header, CHECKSUM_SIZE, HEADER_SIZE, MAGIC0, MAGIC1,
};
pub use message::{ErrorReason, ErrorReport, InvoiceAssignment, StatusReport};

/// Default port for the vefd server.
pub const DEFAULT_PORT: u16 = 7340;

/// Maximum frame content length (64 KiB).
///
/// The wire format allows a 4-byte length; this bound is a local safety
/// limit, not part of the device contract.
pub const MAX_CONTENT_SIZE: u32 = 64 * 1024;
