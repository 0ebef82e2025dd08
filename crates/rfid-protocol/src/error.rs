//! Error types for RFID frame encoding and decoding

use thiserror::Error;

/// Errors that can occur while building an outgoing frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Tag identifier decoded to the wrong number of bytes
    #[error("invalid tag length for {tag:?}: expected {expected} bytes, got {actual}")]
    InvalidTagLength {
        tag: String,
        expected: usize,
        actual: usize,
    },

    /// Tag identifier is not valid hexadecimal
    #[error("invalid tag hex {tag:?}: {reason}")]
    InvalidTagHex { tag: String, reason: String },

    /// Payload does not fit the frame length field
    #[error("payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },

    /// Tag batch would not fit in a single frame
    #[error("too many tags in one batch: {count} (max {max})")]
    TooManyTags { count: usize, max: usize },
}

/// Errors that can occur while parsing incoming reader data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Sync marker not found where a frame should start
    #[error("invalid frame header")]
    InvalidHeader,

    /// Frame trailer does not match the computed checksum
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Frame body is structurally invalid
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}
