//! Envelope header encoding and decoding.
//!
//! Implements the 13-byte envelope header:
//! ```text
//! ┌──────────┬───────┬────────────┬──────────┐
//! │ Type ID  │ Flags │ Channel ID │ Length   │
//! │ 4 bytes  │ 1 byte│ 4 bytes    │ 4 bytes  │
//! │ uint32 BE│       │ uint32 BE  │ uint32 BE│
//! └──────────┴───────┴────────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The body that follows is a
//! MessagePack-encoded request or response message.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DispatchError, Result};

/// Header size in bytes (fixed, exactly 13).
pub const HEADER_SIZE: usize = 13;

/// Default maximum body size (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Reserved type ID (never a valid request type).
pub const RESERVED_TYPE_ID: u32 = 0;

/// Flag constants for the envelope.
pub mod flags {
    /// Bit 0, message type: response (1) or request (0).
    pub const IS_RESPONSE: u8 = 0b0000_0001;

    /// Reserved bits mask (bits 1-7).
    pub const RESERVED_MASK: u8 = 0b1111_1110;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }

    /// Request flags.
    pub const REQUEST: u8 = 0;
    /// Response flags (success and fault alike).
    pub const RESPONSE: u8 = IS_RESPONSE;
}

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Request type identifier (0 reserved).
    pub type_id: u32,
    /// Flags byte (see `flags` module).
    pub flags: u8,
    /// Secure channel the message travels on.
    pub channel_id: u32,
    /// Body length in bytes.
    pub body_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(type_id: u32, flags: u8, channel_id: u32, body_length: u32) -> Self {
        Self {
            type_id,
            flags,
            channel_id,
            body_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use ua_dispatch::protocol::{Header, flags, HEADER_SIZE};
    ///
    /// let header = Header::new(631, flags::RESPONSE, 7, 100);
    /// assert_eq!(header.encode().len(), HEADER_SIZE);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (13 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.type_id.to_be_bytes());
        buf[4] = self.flags;
        buf[5..9].copy_from_slice(&self.channel_id.to_be_bytes());
        buf[9..13].copy_from_slice(&self.body_length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            type_id: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            flags: buf[4],
            channel_id: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]),
            body_length: u32::from_be_bytes([buf[9], buf[10], buf[11], buf[12]]),
        })
    }

    /// Validate an inbound request header.
    ///
    /// Checks:
    /// - Type ID is not 0 (reserved)
    /// - Response flag is not set
    /// - Body length doesn't exceed max
    /// - Reserved flag bits are 0
    pub fn validate_request(&self, max_message_size: u32) -> Result<()> {
        if self.type_id == RESERVED_TYPE_ID {
            return Err(DispatchError::Decoding("Type ID 0 is reserved".to_string()));
        }

        if self.is_response() {
            return Err(DispatchError::Decoding(
                "Expected a request, got a response".to_string(),
            ));
        }

        if self.body_length > max_message_size {
            return Err(DispatchError::Decoding(format!(
                "Body size {} exceeds maximum {}",
                self.body_length, max_message_size
            )));
        }

        if self.flags & flags::RESERVED_MASK != 0 {
            return Err(DispatchError::Decoding(
                "Reserved flag bits must be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if this is a response.
    #[inline]
    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_RESPONSE)
    }
}

/// Build a complete frame (header + body).
///
/// The header's `body_length` is taken from `body`, not from `header`.
pub fn build_frame(header: &Header, body: &[u8]) -> Bytes {
    let header = Header {
        body_length: body.len() as u32,
        ..*header
    };
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buf.put_slice(&header.encode());
    buf.put_slice(body);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_big_endian() {
        let header = Header::new(0x0102_0304, flags::RESPONSE, 0x0A0B_0C0D, 0x10);
        let bytes = header.encode();
        assert_eq!(
            bytes,
            [1, 2, 3, 4, 0x01, 0x0A, 0x0B, 0x0C, 0x0D, 0, 0, 0, 0x10]
        );
        assert_eq!(Header::decode(&bytes), Some(header));
    }

    #[test]
    fn test_build_frame_sets_length() {
        let header = Header::new(631, flags::RESPONSE, 3, 0);
        let frame = build_frame(&header, b"hello");
        assert_eq!(frame.len(), HEADER_SIZE + 5);

        let decoded = Header::decode(&frame).unwrap();
        assert_eq!(decoded.body_length, 5);
        assert_eq!(&frame[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_decode_too_short() {
        assert!(Header::decode(&[0u8; HEADER_SIZE - 1]).is_none());
    }

    #[test]
    fn test_validate_reserved_type_id() {
        let header = Header::new(RESERVED_TYPE_ID, flags::REQUEST, 1, 0);
        assert!(matches!(
            header.validate_request(DEFAULT_MAX_MESSAGE_SIZE),
            Err(DispatchError::Decoding(_))
        ));
    }

    #[test]
    fn test_validate_rejects_response() {
        let header = Header::new(631, flags::RESPONSE, 1, 0);
        assert!(header.validate_request(DEFAULT_MAX_MESSAGE_SIZE).is_err());
    }

    #[test]
    fn test_validate_body_too_large() {
        let header = Header::new(631, flags::REQUEST, 1, 1025);
        assert!(header.validate_request(1024).is_err());
        assert!(header.validate_request(2048).is_ok());
    }

    #[test]
    fn test_validate_reserved_bits() {
        let header = Header::new(631, 0b1000_0000, 1, 0);
        assert!(header.validate_request(DEFAULT_MAX_MESSAGE_SIZE).is_err());
    }

    #[test]
    fn test_response_flag_is_bit_zero() {
        let bytes = Header::new(631, flags::RESPONSE, 1, 0).encode();
        assert_eq!(bytes[4], 0b0000_0001);
        assert_eq!(flags::RESERVED_MASK, !flags::IS_RESPONSE);
    }
}
