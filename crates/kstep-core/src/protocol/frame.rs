//! Fixed 34-byte frame codec.
//!
//! ```text
//! 0        4    5      6    7    8                                  34
//! +--------+----+------+----+----+----------------------------------+
//! | 1B2A4341 | 00 | type | cmd| sub|     payload (26, zero padded)   |
//! +--------+----+------+----+----+----------------------------------+
//! ```

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Payload too large: {len} bytes exceeds {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("Short frame: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },
    #[error("Bad magic: expected 1B 2A 43 41, got {0:02X?}")]
    BadMagic([u8; 4]),
    #[error("Size {0} does not fit in 24 bits")]
    SizeOutOfRange(u32),
}

/// Printer family. Selected by the caller per session, never negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Standard,
    Slim,
}

impl DeviceType {
    pub const fn byte(self) -> u8 {
        match self {
            DeviceType::Standard => DEVICE_TYPE_STANDARD,
            DeviceType::Slim => DEVICE_TYPE_SLIM,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            DEVICE_TYPE_STANDARD => Some(DeviceType::Standard),
            DEVICE_TYPE_SLIM => Some(DeviceType::Slim),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Standard => write!(f, "standard"),
            DeviceType::Slim => write!(f, "slim"),
        }
    }
}

/// One protocol frame. Always exactly [`FRAME_LEN`] bytes with a valid magic.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Build a frame, zero padding `payload` to the full payload region.
    pub fn encode(
        command: u8,
        sub_command: u8,
        device_type: DeviceType,
        payload: &[u8],
    ) -> Result<Self, FrameError> {
        if payload.len() > PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
                max: PAYLOAD_LEN,
            });
        }
        let mut bytes = [0u8; FRAME_LEN];
        bytes[..MAGIC.len()].copy_from_slice(&MAGIC);
        bytes[RESERVED_OFFSET] = 0x00;
        bytes[DEVICE_TYPE_OFFSET] = device_type.byte();
        bytes[COMMAND_OFFSET] = command;
        bytes[SUB_COMMAND_OFFSET] = sub_command;
        bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
        Ok(Self { bytes })
    }

    /// Parse the first [`FRAME_LEN`] bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < FRAME_LEN {
            return Err(FrameError::ShortFrame {
                expected: FRAME_LEN,
                actual: data.len(),
            });
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[..4]);
        if magic != MAGIC {
            return Err(FrameError::BadMagic(magic));
        }
        let mut bytes = [0u8; FRAME_LEN];
        bytes.copy_from_slice(&data[..FRAME_LEN]);
        Ok(Self { bytes })
    }

    pub fn command(&self) -> u8 {
        self.bytes[COMMAND_OFFSET]
    }

    pub fn sub_command(&self) -> u8 {
        self.bytes[SUB_COMMAND_OFFSET]
    }

    /// Raw byte 5. SLIM firmware reuses it for data in some responses.
    pub fn device_type_byte(&self) -> u8 {
        self.bytes[DEVICE_TYPE_OFFSET]
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        DeviceType::from_byte(self.device_type_byte())
    }

    /// The 26-byte payload region.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[PAYLOAD_OFFSET..]
    }

    /// (command, sub-command) correlation key.
    pub fn key(&self) -> (u8, u8) {
        (self.command(), self.sub_command())
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame(type={:02X} cmd={:02X} sub={:02X} payload=",
            self.device_type_byte(),
            self.command(),
            self.sub_command()
        )?;
        // Trailing zero padding is noise in logs.
        let used = self
            .payload()
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        for b in &self.payload()[..used] {
            write!(f, "{:02X}", b)?;
        }
        write!(f, ")")
    }
}

/// Encode a 24-bit size as three big-endian bytes.
pub fn encode_size(n: u32) -> Result<[u8; 3], FrameError> {
    if n > MAX_U24 {
        return Err(FrameError::SizeOutOfRange(n));
    }
    let mut out = [0u8; 3];
    BigEndian::write_u24(&mut out, n);
    Ok(out)
}

/// Decode three big-endian bytes into a size.
pub fn decode_size(bytes: [u8; 3]) -> u32 {
    BigEndian::read_u24(&bytes)
}

/// Dotted version triple (firmware, CNX, TMD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub const fn from_bytes(b: [u8; 3]) -> Self {
        Self::new(b[0], b[1], b[2])
    }

    pub const fn to_bytes(self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
