//! Binary frame format for the ESD frame protocol.
//!
//! Frame layout (7-byte header + payload + 2-byte checksum trailer):
//!
//! ```text
//! +--------+--------+-----------+---------------+-----------+----------+
//! | magic0 | magic1 | commandId | contentLength | payload   | checksum |
//! | 1 byte | 1 byte |  1 byte   | 4 bytes (BE)  | n bytes   | 2 bytes  |
//! +--------+--------+-----------+---------------+-----------+----------+
//! ```
//!
//! The checksum covers every byte preceding it.

use crate::checksum::checksum;
use crate::error::ProtocolError;
use crate::MAX_CONTENT_SIZE;
use bytes::{BufMut, Bytes, BytesMut};

/// First sentinel byte of every frame.
pub const MAGIC0: u8 = 0x1A;

/// Second sentinel byte of every frame.
pub const MAGIC1: u8 = 0x5D;

/// Size of the fixed frame header in bytes (2 magic + command + length).
pub const HEADER_SIZE: usize = 7;

/// Size of the checksum trailer in bytes.
pub const CHECKSUM_SIZE: usize = 2;

/// Frame command ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Status check; answered with the server's online document.
    Status = 1,
    /// Work request; answered with an invoice assignment.
    Data = 2,
    /// Fault report; only ever sent by the server.
    Error = 3,
}

impl Command {
    /// Validates a request command id. ERROR is response-only and is not
    /// accepted from a device.
    pub fn from_request(raw: u8) -> Option<Command> {
        match raw {
            1 => Some(Command::Status),
            2 => Some(Command::Data),
            _ => None,
        }
    }

    /// Validates a response command id as seen by a device.
    pub fn from_response(raw: u8) -> Option<Command> {
        match raw {
            3 => Some(Command::Error),
            other => Command::from_request(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Header validation outcome when a check does not hold.
///
/// Each variant carries the offending byte. Checks are classified in a
/// fixed priority order: magic0, then magic1, then the command id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFault {
    BadMagic0(u8),
    BadMagic1(u8),
    BadCommand(u8),
}

impl FrameFault {
    /// Stable numeric classification (1 = magic0, 2 = magic1, 3 = command).
    pub fn code(&self) -> u8 {
        match self {
            FrameFault::BadMagic0(_) => 1,
            FrameFault::BadMagic1(_) => 2,
            FrameFault::BadCommand(_) => 3,
        }
    }
}

impl std::fmt::Display for FrameFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameFault::BadMagic0(b) => write!(f, "bad magic0 byte {:#04x}", b),
            FrameFault::BadMagic1(b) => write!(f, "bad magic1 byte {:#04x}", b),
            FrameFault::BadCommand(b) => write!(f, "invalid command id {:#04x}", b),
        }
    }
}

/// A validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command: Command,
    pub content_len: u32,
}

impl Header {
    /// Decodes and validates the 7-byte fixed header of a request.
    pub fn decode(raw: &[u8; HEADER_SIZE]) -> Result<Header, FrameFault> {
        Self::decode_inner(raw, false)
    }

    /// Decoding for the device side, where ERROR is a valid command.
    pub fn decode_response(raw: &[u8; HEADER_SIZE]) -> Result<Header, FrameFault> {
        Self::decode_inner(raw, true)
    }

    fn decode_inner(raw: &[u8; HEADER_SIZE], allow_error: bool) -> Result<Header, FrameFault> {
        if raw[0] != MAGIC0 {
            return Err(FrameFault::BadMagic0(raw[0]));
        }
        if raw[1] != MAGIC1 {
            return Err(FrameFault::BadMagic1(raw[1]));
        }
        let command = if allow_error {
            Command::from_response(raw[2])
        } else {
            Command::from_request(raw[2])
        }
        .ok_or(FrameFault::BadCommand(raw[2]))?;
        let content_len = u32::from_be_bytes([raw[3], raw[4], raw[5], raw[6]]);
        Ok(Header {
            command,
            content_len,
        })
    }

    /// Re-encodes the header; used when recomputing the checksum.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let len = self.content_len.to_be_bytes();
        [
            MAGIC0,
            MAGIC1,
            self.command.as_u8(),
            len[0],
            len[1],
            len[2],
            len[3],
        ]
    }

    /// Number of bytes the frame occupies after the header.
    pub fn body_len(&self) -> usize {
        self.content_len as usize + CHECKSUM_SIZE
    }
}

/// A complete frame ready to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(command: Command, payload: Bytes) -> Self {
        Self { command, payload }
    }

    /// Builds a frame around a JSON-serialized document.
    pub fn from_json<T: serde::Serialize>(command: Command, doc: &T) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(doc)?;
        Ok(Self::new(command, Bytes::from(payload)))
    }

    /// Encodes the frame into wire bytes, checksum included.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let content_len = self.payload.len() as u32;
        if content_len > MAX_CONTENT_SIZE {
            return Err(ProtocolError::ContentTooLarge {
                size: content_len,
                max: MAX_CONTENT_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE);
        buf.put_u8(MAGIC0);
        buf.put_u8(MAGIC1);
        buf.put_u8(self.command.as_u8());
        buf.put_u32(content_len);
        buf.put_slice(&self.payload);

        let crc = checksum(&buf);
        buf.put_u16(crc);

        Ok(buf)
    }
}

/// A decoded frame body with its integrity verdict.
#[derive(Debug)]
pub struct Body {
    pub payload: Bytes,
    /// Checksum carried in the frame trailer.
    pub received: u16,
    /// Checksum recomputed over header and payload.
    pub computed: u16,
}

impl Body {
    pub fn checksum_ok(&self) -> bool {
        self.received == self.computed
    }
}

/// Splits a complete frame body into payload and checksum trailer.
///
/// `body` must hold exactly `content_len + 2` bytes; the caller's buffering
/// guarantees this before the checksum is ever validated.
pub fn decode_body(header: &Header, body: &[u8]) -> Body {
    debug_assert_eq!(body.len(), header.body_len());

    let (payload, trailer) = body.split_at(header.content_len as usize);
    let received = u16::from_be_bytes([trailer[0], trailer[1]]);

    let mut covered = Vec::with_capacity(HEADER_SIZE + payload.len());
    covered.extend_from_slice(&header.encode());
    covered.extend_from_slice(payload);
    let computed = checksum(&covered);

    Body {
        payload: Bytes::copy_from_slice(payload),
        received,
        computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(command: Command, payload: &[u8]) -> BytesMut {
        Frame::new(command, Bytes::copy_from_slice(payload))
            .encode()
            .unwrap()
    }

    #[test]
    fn test_wire_length_invariant() {
        let encoded = encode(Command::Data, b"{\"invoice_code\":\"INV001\"}");
        assert_eq!(encoded.len(), HEADER_SIZE + 25 + CHECKSUM_SIZE);
    }

    #[test]
    fn test_header_roundtrip() {
        let encoded = encode(Command::Status, b"");
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&encoded[..HEADER_SIZE]);

        let header = Header::decode(&raw).unwrap();
        assert_eq!(header.command, Command::Status);
        assert_eq!(header.content_len, 0);
        assert_eq!(header.encode(), raw);
    }

    #[test]
    fn test_body_checksum_ok() {
        let payload = b"{\"status\":\"online\"}";
        let encoded = encode(Command::Status, payload);
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&encoded[..HEADER_SIZE]);
        let header = Header::decode(&raw).unwrap();

        let body = decode_body(&header, &encoded[HEADER_SIZE..]);
        assert!(body.checksum_ok());
        assert_eq!(body.payload.as_ref(), payload);
    }

    #[test]
    fn test_tampered_payload_fails_checksum() {
        let mut encoded = encode(Command::Data, b"{\"invoice_number\":\"4432\"}");
        encoded[HEADER_SIZE + 3] ^= 0x40;

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&encoded[..HEADER_SIZE]);
        let header = Header::decode(&raw).unwrap();

        let body = decode_body(&header, &encoded[HEADER_SIZE..]);
        assert!(!body.checksum_ok());
    }

    #[test]
    fn test_fault_priority() {
        // magic0 wins even when everything after it is also wrong.
        let raw = [0x00, 0x00, 0x09, 0, 0, 0, 0];
        assert_eq!(Header::decode(&raw), Err(FrameFault::BadMagic0(0x00)));

        let raw = [MAGIC0, 0x00, 0x09, 0, 0, 0, 0];
        assert_eq!(Header::decode(&raw), Err(FrameFault::BadMagic1(0x00)));

        let raw = [MAGIC0, MAGIC1, 0x09, 0, 0, 0, 0];
        assert_eq!(Header::decode(&raw), Err(FrameFault::BadCommand(0x09)));
    }

    #[test]
    fn test_error_command_rejected_in_requests() {
        let raw = [MAGIC0, MAGIC1, 0x03, 0, 0, 0, 0];
        assert_eq!(Header::decode(&raw), Err(FrameFault::BadCommand(0x03)));
        assert_eq!(
            Header::decode_response(&raw).unwrap().command,
            Command::Error
        );
    }

    #[test]
    fn test_fault_codes() {
        assert_eq!(FrameFault::BadMagic0(0).code(), 1);
        assert_eq!(FrameFault::BadMagic1(0).code(), 2);
        assert_eq!(FrameFault::BadCommand(0).code(), 3);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let huge = Bytes::from(vec![0u8; crate::MAX_CONTENT_SIZE as usize + 1]);
        let result = Frame::new(Command::Data, huge).encode();
        assert!(matches!(
            result,
            Err(ProtocolError::ContentTooLarge { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_frame_roundtrip(
            command in prop_oneof![Just(Command::Status), Just(Command::Data)],
            payload in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let encoded = encode(command, &payload);
            prop_assert_eq!(encoded.len(), HEADER_SIZE + payload.len() + CHECKSUM_SIZE);

            let mut raw = [0u8; HEADER_SIZE];
            raw.copy_from_slice(&encoded[..HEADER_SIZE]);
            let header = Header::decode(&raw).unwrap();
            prop_assert_eq!(header.command, command);
            prop_assert_eq!(header.content_len as usize, payload.len());

            let body = decode_body(&header, &encoded[HEADER_SIZE..]);
            prop_assert!(body.checksum_ok());
            prop_assert_eq!(body.payload.as_ref(), &payload[..]);
        }
    }
}
