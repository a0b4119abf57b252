//! # vefd-client
//!
//! Device-side client library for vefd.
//!
//! The protocol is one exchange per connection: every call opens a fresh
//! TCP connection, sends a single frame, reads the single response frame
//! and closes.

pub mod client;
pub mod error;

pub use client::{Client, ClientConfig, ResponseFrame};
pub use error::ClientError;
