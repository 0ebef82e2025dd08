//! Streaming decoder for frames sent by a reader
//!
//! This is the timing client's side of the link. The simulator itself only
//! writes, but the decoder lets tools and tests read back what was sent.

use crate::error::ParseError;
use crate::frame::{checksum, CMD_ACTIVE_DATA, HEADER_LEN, LEN_OVERHEAD, STATUS_SUCCESS, SYNC};
use crate::tag::DeviceRecord;
use crate::ProtocolCodec;

/// Upper bound on a frame: header + 0xFFFF length
const MAX_FRAME_LEN: usize = HEADER_LEN + u16::MAX as usize;

/// Outcome reported in the status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Fail,
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        if value == STATUS_SUCCESS {
            Status::Success
        } else {
            Status::Fail
        }
    }
}

/// Decoded command body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderCommand {
    /// Tag detections
    ActiveData(DeviceRecord),
    /// Any command the decoder does not interpret
    Unknown { code: u8, data: Vec<u8> },
}

/// A decoded reader frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderFrame {
    pub address: u8,
    pub status: Status,
    pub command: ReaderCommand,
}

impl ReaderFrame {
    /// Upper-case hex ids of every tag in an active-data frame
    pub fn tag_ids(&self) -> Vec<String> {
        match &self.command {
            ReaderCommand::ActiveData(record) => record.tags.iter().map(|t| t.tag_hex()).collect(),
            ReaderCommand::Unknown { .. } => Vec::new(),
        }
    }
}

/// Streaming reader protocol codec
pub struct RfidCodec {
    buffer: Vec<u8>,
}

impl RfidCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Number of bytes waiting in the buffer
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Try to decode the next frame, surfacing errors
    ///
    /// Returns `None` when more data is needed. On a bad sync marker one byte
    /// is dropped so a marker starting at the next byte is still found; on a
    /// bad body or checksum the whole frame is dropped.
    pub fn decode_next(&mut self) -> Option<Result<(ReaderFrame, Vec<u8>), ParseError>> {
        for (index, expected) in SYNC.iter().enumerate() {
            match self.buffer.get(index) {
                Some(received) if received == expected => {}
                Some(_) => {
                    self.buffer.remove(0);
                    return Some(Err(ParseError::InvalidHeader));
                }
                None => return None,
            }
        }

        let len = u16::from_be_bytes([*self.buffer.get(2)?, *self.buffer.get(3)?]) as usize;
        if self.buffer.len() < HEADER_LEN + len {
            return None;
        }

        let frame: Vec<u8> = self.buffer.drain(..HEADER_LEN + len).collect();
        Some(Self::parse_frame(&frame).map(|parsed| (parsed, frame)))
    }

    /// Validate the checksum and parse a complete frame
    fn parse_frame(frame: &[u8]) -> Result<ReaderFrame, ParseError> {
        if frame.len() < HEADER_LEN + LEN_OVERHEAD {
            return Err(ParseError::InvalidFrame(format!(
                "length field {} below minimum {}",
                frame.len() - HEADER_LEN,
                LEN_OVERHEAD
            )));
        }

        let (&received, without_checksum) = frame
            .split_last()
            .ok_or_else(|| ParseError::InvalidFrame("empty frame".into()))?;
        let expected = checksum(without_checksum);
        if received != expected {
            return Err(ParseError::ChecksumMismatch {
                expected,
                actual: received,
            });
        }

        let [address, code, status, data @ ..] = &without_checksum[HEADER_LEN..] else {
            return Err(ParseError::InvalidFrame("missing frame body".into()));
        };

        let command = match *code {
            CMD_ACTIVE_DATA => ReaderCommand::ActiveData(DeviceRecord::parse(data)?),
            code => ReaderCommand::Unknown {
                code,
                data: data.to_vec(),
            },
        };

        Ok(ReaderFrame {
            address: *address,
            status: Status::from(*status),
            command,
        })
    }
}

impl Default for RfidCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec for RfidCodec {
    type Command = ReaderFrame;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Prevent unbounded growth when fed garbage
        if self.buffer.len() > MAX_FRAME_LEN * 2 {
            let start = self.buffer.len() - MAX_FRAME_LEN;
            self.buffer.drain(..start);
        }
    }

    fn next_command(&mut self) -> Option<Self::Command> {
        self.next_command_with_bytes().map(|(cmd, _)| cmd)
    }

    fn next_command_with_bytes(&mut self) -> Option<(Self::Command, Vec<u8>)> {
        loop {
            match self.decode_next()? {
                Ok(decoded) => return Some(decoded),
                Err(ParseError::InvalidHeader) => {
                    tracing::trace!("Skipping byte outside of a frame");
                }
                Err(e) => tracing::warn!("Failed to parse reader frame: {}", e),
            }
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::active_data_frame;
    use crate::tag::TagValue;

    fn codec_with(data: &[u8]) -> RfidCodec {
        let mut codec = RfidCodec::new();
        codec.push_bytes(data);
        codec
    }

    #[test]
    fn test_no_data() {
        let mut codec = RfidCodec::new();
        assert!(codec.decode_next().is_none());
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_partial_sync_waits() {
        let mut codec = codec_with(&[0x43]);
        assert!(codec.decode_next().is_none());
        assert_eq!(codec.buffered(), 1);
    }

    #[test]
    fn test_wrong_first_byte() {
        let mut codec = codec_with(&[0x11]);
        assert_eq!(codec.decode_next(), Some(Err(ParseError::InvalidHeader)));
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_wrong_second_byte() {
        let mut codec = codec_with(&[0x43, 0xAA]);
        assert_eq!(codec.decode_next(), Some(Err(ParseError::InvalidHeader)));
        assert_eq!(codec.buffered(), 1);
        assert_eq!(codec.decode_next(), Some(Err(ParseError::InvalidHeader)));
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_resync_on_repeated_sync_byte() {
        let mut codec = codec_with(&[0x43, 0x43, 0x54, 0x00, 0x04, 0x00, 0x42, 0x01, 0x22]);
        let frame = codec.next_command().unwrap();
        assert_eq!(frame.status, Status::Success);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_incomplete_length() {
        let mut codec = codec_with(&[0x43, 0x54, 0x00]);
        assert!(codec.decode_next().is_none());
        assert_eq!(codec.buffered(), 3);
    }

    #[test]
    fn test_incomplete_body() {
        let mut codec = codec_with(&[0x43, 0x54, 0x00, 0x02, 0x01]);
        assert!(codec.decode_next().is_none());
        assert_eq!(codec.buffered(), 5);
    }

    #[test]
    fn test_wrong_checksum() {
        let mut codec = codec_with(&[
            0x43, 0x54, // sync
            0x00, 0x1C, // length
            0x00, // address
            0x45, // command
            0x01, // status
            0xC3, 0x85, 0x14, 0x01, 0x02, 0x01, 0xA4, 0x01, 0x0F, 0x01, 0x01, 0x85, 0x13, 0x33,
            0x6D, 0xB6, 0x2D, 0x6D, 0xC2, 0xD4, 0x20, 0x6C, 0xE7, 0xBC, // payload
            0x11, // wrong checksum
        ]);
        assert_eq!(
            codec.decode_next(),
            Some(Err(ParseError::ChecksumMismatch {
                expected: 0xA4,
                actual: 0x11
            }))
        );
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_unknown_command_with_leftover() {
        let mut codec = codec_with(&[
            0x43, 0x54, 0x00, 0x04, 0x00, 0x42, 0x00, 0x23, // frame
            0xAA, 0xBB, // start of something else
        ]);
        let (frame, raw) = codec.decode_next().unwrap().unwrap();
        assert_eq!(
            frame,
            ReaderFrame {
                address: 0,
                status: Status::Fail,
                command: ReaderCommand::Unknown {
                    code: 0x42,
                    data: vec![]
                },
            }
        );
        assert_eq!(raw.len(), 8);
        assert_eq!(codec.buffered(), 2);
    }

    #[test]
    fn test_active_data_from_hardware() {
        let mut codec = codec_with(&[
            0x43, 0x54, 0x00, 0x1C, 0x00, 0x45, 0x01, // header
            0xC3, 0x85, 0x14, 0x01, 0x02, 0x01, 0xA4, // serial
            0x01, // count
            0x0F, 0x01, 0x01, // length, type, antenna
            0x85, 0x13, 0x33, 0x6D, 0xB6, 0x2D, 0x6D, 0xC2, 0xD4, 0x20, 0x6C, 0xE7, // tag
            0xBC, // rssi
            0xA4, // checksum
        ]);
        let frame = codec.next_command().unwrap();
        assert_eq!(frame.status, Status::Success);
        assert_eq!(frame.tag_ids(), vec!["8513336DB62D6DC2D4206CE7".to_string()]);
        let ReaderCommand::ActiveData(record) = frame.command else {
            panic!("expected active data");
        };
        assert_eq!(record.serial, [0xC3, 0x85, 0x14, 0x01, 0x02, 0x01, 0xA4]);
        assert_eq!(record.tags[0].rssi, 0xBC);
    }

    #[test]
    fn test_active_data_corrupted() {
        let mut codec = codec_with(&[
            0x43, 0x54, 0x00, 0x12, 0x00, 0x45, 0x01, // header
            0xC3, 0x85, 0x14, 0x01, 0x02, 0x01, 0xA4, // serial
            0x01, // count
            0x0F, 0x01, 0x01, 0x85, 0x13, // declared 15 bytes, only 4 present
            0xBC, // rssi
            0xA7, // checksum
        ]);
        assert!(matches!(
            codec.decode_next(),
            Some(Err(ParseError::InvalidFrame(_)))
        ));
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_decodes_simulated_frame() {
        let tags: Vec<TagValue> = ["E200000001", "E200000002"]
            .iter()
            .map(|t| t.parse().unwrap())
            .collect();
        let encoded = active_data_frame(&tags).unwrap();

        // garbage before the frame and a split delivery
        let mut codec = codec_with(&[0x00, 0x43]);
        codec.push_bytes(&encoded[..5]);
        assert!(codec.next_command().is_none());
        codec.push_bytes(&encoded[5..]);

        let (frame, raw) = codec.next_command_with_bytes().unwrap();
        assert_eq!(raw, encoded);
        assert_eq!(frame.address, 0x01);
        assert_eq!(frame.tag_ids(), vec!["E200000001", "E200000002"]);
    }

    #[test]
    fn test_length_below_minimum() {
        let mut codec = codec_with(&[0x43, 0x54, 0x00, 0x01, 0x68]);
        assert!(matches!(
            codec.decode_next(),
            Some(Err(ParseError::InvalidFrame(_)))
        ));
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_clear() {
        let mut codec = codec_with(&[0x43, 0x54, 0x00]);
        codec.clear();
        assert_eq!(codec.buffered(), 0);
    }
}
