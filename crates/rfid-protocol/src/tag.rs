//! Tag identifiers and the active-data device record
//!
//! A reader reports detected tags as a `DeviceRecord` payload:
//!
//! ```text
//! [serial x7] [count] ( [content_len] [type] [antenna] [tag id...] [rssi] )*
//! ```
//!
//! `content_len` counts every byte of the sub-record after itself.

use std::fmt;
use std::str::FromStr;

use crate::error::{ParseError, ProtocolError};
use crate::frame::MAX_PAYLOAD_LEN;

/// Number of bytes in a tag identifier
pub const TAG_ID_LEN: usize = 5;
/// Serial number reported by every simulated reader
pub const SIMULATED_SERIAL: [u8; 7] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
/// Tag type byte for simulated reads
pub const TAG_TYPE: u8 = 0x01;
/// Antenna byte for simulated reads
pub const ANTENNA: u8 = 0x02;
/// Signal strength byte for simulated reads
pub const RSSI: u8 = 0x22;

/// Bytes of a sub-record that are not the tag id (type, antenna, rssi)
const SUB_RECORD_OVERHEAD: usize = 3;
/// Bytes before the first sub-record (serial + count)
const RECORD_HEADER_LEN: usize = SIMULATED_SERIAL.len() + 1;

/// Largest number of fixed-length tags that fit in one frame
pub const MAX_TAGS_PER_FRAME: usize =
    (MAX_PAYLOAD_LEN - RECORD_HEADER_LEN) / (1 + SUB_RECORD_OVERHEAD + TAG_ID_LEN);

/// A physical tag identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagValue([u8; TAG_ID_LEN]);

impl TagValue {
    /// Create a tag from raw bytes
    pub fn new(bytes: [u8; TAG_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw identifier bytes
    pub fn as_bytes(&self) -> &[u8; TAG_ID_LEN] {
        &self.0
    }

    /// Upper-case hex rendering, as printed by the timing client
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl FromStr for TagValue {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| ProtocolError::InvalidTagHex {
            tag: s.to_string(),
            reason: e.to_string(),
        })?;
        let actual = bytes.len();
        let bytes: [u8; TAG_ID_LEN] =
            bytes
                .try_into()
                .map_err(|_| ProtocolError::InvalidTagLength {
                    tag: s.to_string(),
                    expected: TAG_ID_LEN,
                    actual,
                })?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for TagValue {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TagValue> for String {
    fn from(tag: TagValue) -> Self {
        tag.to_hex()
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Parse a batch of tag strings, rejecting the whole batch on the first bad tag
pub fn parse_tags<S: AsRef<str>>(tags: &[S]) -> Result<Vec<TagValue>, ProtocolError> {
    tags.iter().map(|t| t.as_ref().parse()).collect()
}

/// One tag detection inside a device record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRead {
    pub tag_type: u8,
    pub antenna: u8,
    /// Identifier bytes; decoded records may carry ids of any length
    pub tag_id: Vec<u8>,
    pub rssi: u8,
}

impl TagRead {
    /// A read of `tag` with the simulator's fixed type/antenna/rssi
    pub fn simulated(tag: &TagValue) -> Self {
        Self {
            tag_type: TAG_TYPE,
            antenna: ANTENNA,
            tag_id: tag.as_bytes().to_vec(),
            rssi: RSSI,
        }
    }

    /// Value of the content-length byte for this sub-record
    pub fn content_len(&self) -> usize {
        self.tag_id.len() + SUB_RECORD_OVERHEAD
    }

    /// Tag id as upper-case hex
    pub fn tag_hex(&self) -> String {
        hex::encode_upper(&self.tag_id)
    }
}

/// Reader serial number plus a batch of detected tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub serial: [u8; 7],
    pub tags: Vec<TagRead>,
}

impl DeviceRecord {
    /// Serialize into an active-data payload
    pub fn to_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let count = u8::try_from(self.tags.len()).map_err(|_| ProtocolError::TooManyTags {
            count: self.tags.len(),
            max: MAX_TAGS_PER_FRAME,
        })?;

        let mut payload = Vec::with_capacity(
            RECORD_HEADER_LEN + self.tags.iter().map(|t| 1 + t.content_len()).sum::<usize>(),
        );
        payload.extend_from_slice(&self.serial);
        payload.push(count);
        for tag in &self.tags {
            let content_len =
                u8::try_from(tag.content_len()).map_err(|_| ProtocolError::PayloadTooLong {
                    len: tag.content_len(),
                    max: u8::MAX as usize,
                })?;
            payload.push(content_len);
            payload.push(tag.tag_type);
            payload.push(tag.antenna);
            payload.extend_from_slice(&tag.tag_id);
            payload.push(tag.rssi);
        }
        Ok(payload)
    }

    /// Parse an active-data payload
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < RECORD_HEADER_LEN {
            return Err(ParseError::InvalidFrame(format!(
                "device record needs {} bytes, got {}",
                RECORD_HEADER_LEN,
                data.len()
            )));
        }

        let mut serial = [0u8; 7];
        serial.copy_from_slice(&data[..7]);
        let count = data[7] as usize;

        let mut rest = &data[RECORD_HEADER_LEN..];
        let mut tags = Vec::with_capacity(count);
        for i in 0..count {
            let (&content_len, body) = rest.split_first().ok_or_else(|| {
                ParseError::InvalidFrame(format!("missing sub-record {} of {}", i + 1, count))
            })?;
            let content_len = content_len as usize;
            if content_len < SUB_RECORD_OVERHEAD || body.len() < content_len {
                return Err(ParseError::InvalidFrame(format!(
                    "sub-record {} truncated: length {} with {} bytes left",
                    i + 1,
                    content_len,
                    body.len()
                )));
            }
            let content = &body[..content_len];
            tags.push(TagRead {
                tag_type: content[0],
                antenna: content[1],
                tag_id: content[2..content_len - 1].to_vec(),
                rssi: content[content_len - 1],
            });
            rest = &body[content_len..];
        }

        Ok(Self { serial, tags })
    }
}

/// Build the active-data payload for a batch of tags
pub fn encode_tag_batch(serial: [u8; 7], tags: &[TagValue]) -> Result<Vec<u8>, ProtocolError> {
    if tags.len() > MAX_TAGS_PER_FRAME {
        return Err(ProtocolError::TooManyTags {
            count: tags.len(),
            max: MAX_TAGS_PER_FRAME,
        });
    }

    DeviceRecord {
        serial,
        tags: tags.iter().map(TagRead::simulated).collect(),
    }
    .to_payload()
}
