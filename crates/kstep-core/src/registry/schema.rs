//! Payload schemas: named fields at fixed frame offsets.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use super::Direction;
use crate::protocol::constants::{FRAME_LEN, PAYLOAD_LEN, PAYLOAD_OFFSET};
use crate::protocol::{Frame, Version, decode_size, encode_size};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No schema for command {command:#04X} sub {sub_command:#04X} ({direction})")]
    UnknownMessage {
        command: u8,
        sub_command: u8,
        direction: Direction,
    },
    #[error("Missing field '{0}'")]
    MissingField(String),
    #[error("Unknown field '{0}'")]
    UnknownField(String),
    #[error("Field '{name}' expects {expected}")]
    TypeMismatch { name: String, expected: &'static str },
    #[error("Value for '{name}' does not fit: {reason}")]
    Overflow { name: String, reason: String },
}

/// Semantic type of a field. Width is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    /// Big-endian.
    U16,
    /// 24-bit big-endian byte count.
    Size,
    /// Three bytes read as a dotted version.
    Version,
    /// Fixed-width ASCII, NUL padded.
    Ascii(usize),
    /// Six-byte hardware address.
    Mac,
}

impl FieldKind {
    pub const fn width(self) -> usize {
        match self {
            FieldKind::U8 => 1,
            FieldKind::U16 => 2,
            FieldKind::Size | FieldKind::Version => 3,
            FieldKind::Ascii(n) => n,
            FieldKind::Mac => 6,
        }
    }

    fn type_name(self) -> &'static str {
        match self {
            FieldKind::U8 => "u8",
            FieldKind::U16 => "u16",
            FieldKind::Size => "u24 size",
            FieldKind::Version => "u24 version",
            FieldKind::Ascii(_) => "ascii",
            FieldKind::Mac => "mac",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    /// Absolute offset inside the 34-byte frame.
    pub offset: usize,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, kind: FieldKind) -> Self {
        Self { name, offset, kind }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.kind.width()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    Size(u32),
    Version(Version),
    Ascii(String),
    Mac([u8; 6]),
}

/// Decoded field values in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<(&'static str, FieldValue)>);

impl Fields {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FieldValue)> {
        self.0.iter()
    }

    fn require(&self, name: &str) -> Result<&FieldValue, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::MissingField(name.to_string()))
    }

    pub fn u8(&self, name: &str) -> Result<u8, RegistryError> {
        match self.require(name)? {
            FieldValue::U8(v) => Ok(*v),
            _ => Err(mismatch(name, FieldKind::U8)),
        }
    }

    pub fn u16(&self, name: &str) -> Result<u16, RegistryError> {
        match self.require(name)? {
            FieldValue::U16(v) => Ok(*v),
            _ => Err(mismatch(name, FieldKind::U16)),
        }
    }

    pub fn size(&self, name: &str) -> Result<u32, RegistryError> {
        match self.require(name)? {
            FieldValue::Size(v) => Ok(*v),
            _ => Err(mismatch(name, FieldKind::Size)),
        }
    }

    pub fn version(&self, name: &str) -> Result<Version, RegistryError> {
        match self.require(name)? {
            FieldValue::Version(v) => Ok(*v),
            _ => Err(mismatch(name, FieldKind::Version)),
        }
    }

    pub fn ascii(&self, name: &str) -> Result<&str, RegistryError> {
        match self.require(name)? {
            FieldValue::Ascii(v) => Ok(v),
            _ => Err(mismatch(name, FieldKind::Ascii(0))),
        }
    }

    pub fn mac(&self, name: &str) -> Result<[u8; 6], RegistryError> {
        match self.require(name)? {
            FieldValue::Mac(v) => Ok(*v),
            _ => Err(mismatch(name, FieldKind::Mac)),
        }
    }
}

fn mismatch(name: &str, kind: FieldKind) -> RegistryError {
    RegistryError::TypeMismatch {
        name: name.to_string(),
        expected: kind.type_name(),
    }
}

/// Field layout for one message direction.
#[derive(Debug, PartialEq, Eq)]
pub struct Schema {
    pub fields: &'static [Field],
}

impl Schema {
    pub const fn new(fields: &'static [Field]) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Read every field out of a frame.
    pub fn decode(&self, frame: &Frame) -> Fields {
        let bytes = frame.as_bytes();
        let values = self
            .fields
            .iter()
            .map(|field| (field.name, read_field(field, &bytes[field.offset..field.end()])))
            .collect();
        Fields(values)
    }

    /// Lay `values` out in a payload region. Every schema field must be
    /// supplied exactly; unknown names are rejected.
    pub fn encode_payload(
        &self,
        values: &[(&str, FieldValue)],
    ) -> Result<[u8; PAYLOAD_LEN], RegistryError> {
        if let Some((name, _)) = values.iter().find(|(n, _)| self.field(n).is_none()) {
            return Err(RegistryError::UnknownField(name.to_string()));
        }

        let mut payload = [0u8; PAYLOAD_LEN];
        for field in self.fields {
            let value = values
                .iter()
                .find(|(n, _)| *n == field.name)
                .map(|(_, v)| v)
                .ok_or_else(|| RegistryError::MissingField(field.name.to_string()))?;

            let start = field
                .offset
                .checked_sub(PAYLOAD_OFFSET)
                .filter(|_| field.end() <= FRAME_LEN)
                .ok_or_else(|| RegistryError::Overflow {
                    name: field.name.to_string(),
                    reason: format!("offset {} is outside the payload region", field.offset),
                })?;
            let slot = &mut payload[start..start + field.kind.width()];
            write_field(field, value, slot)?;
        }
        Ok(payload)
    }
}

fn read_field(field: &Field, raw: &[u8]) -> FieldValue {
    match field.kind {
        FieldKind::U8 => FieldValue::U8(raw[0]),
        FieldKind::U16 => FieldValue::U16(BigEndian::read_u16(raw)),
        FieldKind::Size => FieldValue::Size(decode_size([raw[0], raw[1], raw[2]])),
        FieldKind::Version => FieldValue::Version(Version::from_bytes([raw[0], raw[1], raw[2]])),
        FieldKind::Ascii(_) => {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            FieldValue::Ascii(String::from_utf8_lossy(&raw[..end]).into_owned())
        }
        FieldKind::Mac => {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(raw);
            FieldValue::Mac(mac)
        }
    }
}

fn write_field(field: &Field, value: &FieldValue, slot: &mut [u8]) -> Result<(), RegistryError> {
    match (field.kind, value) {
        (FieldKind::U8, FieldValue::U8(v)) => slot[0] = *v,
        (FieldKind::U16, FieldValue::U16(v)) => BigEndian::write_u16(slot, *v),
        (FieldKind::Size, FieldValue::Size(v)) => {
            let bytes = encode_size(*v).map_err(|e| RegistryError::Overflow {
                name: field.name.to_string(),
                reason: e.to_string(),
            })?;
            slot.copy_from_slice(&bytes);
        }
        (FieldKind::Version, FieldValue::Version(v)) => slot.copy_from_slice(&v.to_bytes()),
        (FieldKind::Ascii(width), FieldValue::Ascii(s)) => {
            if !s.is_ascii() || s.len() > width {
                return Err(RegistryError::Overflow {
                    name: field.name.to_string(),
                    reason: format!("expected at most {} ASCII bytes", width),
                });
            }
            slot[..s.len()].copy_from_slice(s.as_bytes());
        }
        (FieldKind::Mac, FieldValue::Mac(m)) => slot.copy_from_slice(m),
        (kind, _) => return Err(mismatch(field.name, kind)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DeviceType;

    static FIELDS: [Field; 4] = [
        Field::new("size", 8, FieldKind::Size),
        Field::new("count", 11, FieldKind::U8),
        Field::new("limit", 12, FieldKind::U16),
        Field::new("label", 14, FieldKind::Ascii(4)),
    ];
    static SCHEMA: Schema = Schema::new(&FIELDS);

    #[test]
    fn test_encode_then_decode() {
        let payload = SCHEMA
            .encode_payload(&[
                ("size", FieldValue::Size(0x0A0B0C)),
                ("count", FieldValue::U8(3)),
                ("limit", FieldValue::U16(0x1234)),
                ("label", FieldValue::Ascii("ab".into())),
            ])
            .unwrap();
        assert_eq!(&payload[..8], &[0x0A, 0x0B, 0x0C, 3, 0x12, 0x34, b'a', b'b']);

        let frame = Frame::encode(0, 0, DeviceType::Standard, &payload).unwrap();
        let fields = SCHEMA.decode(&frame);
        assert_eq!(fields.size("size").unwrap(), 0x0A0B0C);
        assert_eq!(fields.u16("limit").unwrap(), 0x1234);
        assert_eq!(fields.ascii("label").unwrap(), "ab");
    }

    #[test]
    fn test_missing_and_unknown_fields() {
        let err = SCHEMA
            .encode_payload(&[("size", FieldValue::Size(1))])
            .unwrap_err();
        assert_eq!(err, RegistryError::MissingField("count".into()));

        let err = SCHEMA.encode_payload(&[("bogus", FieldValue::U8(1))]).unwrap_err();
        assert_eq!(err, RegistryError::UnknownField("bogus".into()));
    }

    #[test]
    fn test_type_mismatch() {
        let err = SCHEMA
            .encode_payload(&[
                ("size", FieldValue::U8(1)),
                ("count", FieldValue::U8(3)),
                ("limit", FieldValue::U16(1)),
                ("label", FieldValue::Ascii(String::new())),
            ])
            .unwrap_err();
        assert!(matches!(err, RegistryError::TypeMismatch { .. }));
    }

    #[test]
    fn test_ascii_overflow() {
        let err = SCHEMA
            .encode_payload(&[
                ("size", FieldValue::Size(1)),
                ("count", FieldValue::U8(3)),
                ("limit", FieldValue::U16(1)),
                ("label", FieldValue::Ascii("toolong".into())),
            ])
            .unwrap_err();
        assert!(matches!(err, RegistryError::Overflow { .. }));
    }
}
