//! Incremental decoding of frames from a byte stream.

use crate::error::ProtocolError;
use crate::frame::{decode_body, Command, FrameFault, Header, HEADER_SIZE};
use crate::MAX_CONTENT_SIZE;
use bytes::{Buf, Bytes, BytesMut};
use serde_json::Value;

/// One fully-assembled inbound exchange, classified.
///
/// Dispatch downstream is a function of this value alone; there are no
/// side flags to consult.
#[derive(Debug)]
pub enum Inbound {
    /// A structurally valid frame with a matching checksum.
    Request {
        command: Command,
        payload: Bytes,
        /// The payload parsed as a JSON document, when it is one. The
        /// engine never interprets request documents, so parse failures
        /// are not an error class.
        document: Option<Value>,
    },
    /// The fixed header failed validation; the body was not awaited.
    FramingFault(FrameFault),
    /// The body arrived in full but its integrity check failed.
    ChecksumFault {
        command: Command,
        received: u16,
        computed: u16,
    },
}

enum Phase {
    Header,
    Body(Header),
}

/// Accumulates socket bytes and assembles complete frames.
///
/// A single read may deliver any number of bytes; the header is parsed
/// exactly once and a partial body never causes it to be re-read.
pub struct Decoder {
    buf: BytesMut,
    phase: Phase,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(8192),
            phase: Phase::Header,
        }
    }

    /// Appends raw socket bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether a header has been parsed and the body is still incomplete.
    pub fn awaiting_body(&self) -> bool {
        matches!(self.phase, Phase::Body(_))
    }

    /// Attempts to assemble the next inbound exchange from a device.
    ///
    /// Returns `Ok(None)` until enough bytes have arrived.
    pub fn poll(&mut self) -> Result<Option<Inbound>, ProtocolError> {
        self.poll_inner(false)
    }

    /// Device-side variant: accepts ERROR as a valid response command.
    pub fn poll_response(&mut self) -> Result<Option<Inbound>, ProtocolError> {
        self.poll_inner(true)
    }

    fn poll_inner(&mut self, allow_error: bool) -> Result<Option<Inbound>, ProtocolError> {
        if let Phase::Header = self.phase {
            if self.buf.len() < HEADER_SIZE {
                return Ok(None);
            }
            let mut raw = [0u8; HEADER_SIZE];
            raw.copy_from_slice(&self.buf[..HEADER_SIZE]);
            self.buf.advance(HEADER_SIZE);

            let decoded = if allow_error {
                Header::decode_response(&raw)
            } else {
                Header::decode(&raw)
            };
            let header = match decoded {
                Ok(header) => header,
                Err(fault) => return Ok(Some(Inbound::FramingFault(fault))),
            };
            if header.content_len > MAX_CONTENT_SIZE {
                return Err(ProtocolError::ContentTooLarge {
                    size: header.content_len,
                    max: MAX_CONTENT_SIZE,
                });
            }
            self.phase = Phase::Body(header);
        }

        let Phase::Body(header) = &self.phase else {
            return Ok(None);
        };
        if self.buf.len() < header.body_len() {
            return Ok(None);
        }

        let body = self.buf.split_to(header.body_len());
        let decoded = decode_body(header, &body);
        let command = header.command;
        self.phase = Phase::Header;

        if !decoded.checksum_ok() {
            return Ok(Some(Inbound::ChecksumFault {
                command,
                received: decoded.received,
                computed: decoded.computed,
            }));
        }

        let document = parse_document(&decoded.payload);
        Ok(Some(Inbound::Request {
            command,
            payload: decoded.payload,
            document,
        }))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_document(payload: &[u8]) -> Option<Value> {
    if payload.is_empty() {
        return None;
    }
    serde_json::from_slice(payload).ok()
}
