//! Reader frame encoding
//!
//! # Frame Format
//! ```text
//! 43 54 [len_hi] [len_lo] [addr] [cmd] [status] [payload...] [checksum]
//! ```
//!
//! - `43 54`: Sync marker
//! - `len`: Big-endian byte count of addr + cmd + status + payload + checksum
//! - `checksum`: Two's complement of the byte sum, so the whole frame sums to 0

use crate::error::ProtocolError;
use crate::tag::{encode_tag_batch, TagValue, SIMULATED_SERIAL};
use crate::EncodeCommand;

/// Frame sync marker
pub const SYNC: [u8; 2] = [0x43, 0x54];
/// Width of the length field
pub const LEN_BYTES: usize = 2;
/// Sync marker plus length field
pub const HEADER_LEN: usize = SYNC.len() + LEN_BYTES;
/// Bytes counted by the length field besides the payload (addr, cmd, status, checksum)
pub const LEN_OVERHEAD: usize = 4;
/// Largest payload whose length value still fits the low byte of the length field
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - LEN_OVERHEAD;

/// Address the simulated reader reports from
pub const READER_ADDRESS: u8 = 0x01;
/// Active data (tag detections) command
pub const CMD_ACTIVE_DATA: u8 = 0x45;
/// Success status
pub const STATUS_SUCCESS: u8 = 0x01;

/// Checksum byte that makes `data` plus itself sum to zero modulo 256
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0u8.wrapping_sub(sum)
}

/// Encode one frame
///
/// Rejects payloads that would overflow the length field.
pub fn encode(address: u8, command: u8, status: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    Ok(Frame::new(address, command, status, payload.to_vec())?.encode())
}

/// Encode an active-data frame carrying `tags`, as a simulated reader sends it
pub fn active_data_frame(tags: &[TagValue]) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_tag_batch(SIMULATED_SERIAL, tags)?;
    encode(READER_ADDRESS, CMD_ACTIVE_DATA, STATUS_SUCCESS, &payload)
}

/// An outgoing frame with a validated payload length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    address: u8,
    command: u8,
    status: u8,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a frame, checking that the payload fits the length field
    pub fn new(address: u8, command: u8, status: u8, payload: Vec<u8>) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self {
            address,
            command,
            status,
            payload,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Value written into the length field
    pub fn length_field(&self) -> u16 {
        // bounded by MAX_PAYLOAD_LEN in `new`
        (self.payload.len() + LEN_OVERHEAD) as u16
    }
}

impl EncodeCommand for Frame {
    fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_LEN + LEN_OVERHEAD + self.payload.len());
        frame.extend_from_slice(&SYNC);
        frame.extend_from_slice(&self.length_field().to_be_bytes());
        frame.push(self.address);
        frame.push(self.command);
        frame.push(self.status);
        frame.extend_from_slice(&self.payload);
        frame.push(checksum(&frame));
        frame
    }
}
