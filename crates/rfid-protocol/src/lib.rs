//! RFID Reader Protocol Library
//!
//! This crate provides encoding and decoding for the binary serial protocol
//! spoken by the race-timing RFID readers:
//!
//! - **Frames**: sync marker, big-endian length, address/command/status,
//!   payload and a zero-sum checksum trailer
//! - **Active data**: the device record a reader sends when it detects tags
//! - **Streaming decoder**: reassembles frames from partial serial reads
//!
//! # Example
//!
//! ```rust
//! use rfid_protocol::{active_data_frame, ProtocolCodec, RfidCodec, TagValue};
//!
//! let tag: TagValue = "E200A1B2C3".parse().unwrap();
//! let bytes = active_data_frame(&[tag]).unwrap();
//!
//! let mut codec = RfidCodec::new();
//! codec.push_bytes(&bytes);
//!
//! let frame = codec.next_command().unwrap();
//! assert_eq!(frame.tag_ids(), vec!["E200A1B2C3".to_string()]);
//! ```

pub mod codec;
pub mod error;
pub mod frame;
pub mod tag;

pub use codec::{ReaderCommand, ReaderFrame, RfidCodec, Status};
pub use error::{ParseError, ProtocolError};
pub use frame::{active_data_frame, checksum, encode, Frame};
pub use tag::{
    encode_tag_batch, parse_tags, DeviceRecord, TagRead, TagValue, MAX_TAGS_PER_FRAME,
    SIMULATED_SERIAL, TAG_ID_LEN,
};

/// Trait for codecs that parse incoming data streams
pub trait ProtocolCodec {
    /// The command type produced by this codec
    type Command;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete command from the buffer
    fn next_command(&mut self) -> Option<Self::Command>;

    /// Try to extract the next complete command along with its raw bytes
    fn next_command_with_bytes(&mut self) -> Option<(Self::Command, Vec<u8>)>;

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Trait for commands that can be encoded to bytes
pub trait EncodeCommand {
    /// Encode this command to its wire format
    fn encode(&self) -> Vec<u8>;
}
