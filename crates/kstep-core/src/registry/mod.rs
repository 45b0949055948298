//! Command registry - data-driven message schemas.
//!
//! Every supported (command, sub-command) pair is described once in
//! [`table`], separately for requests and responses, optionally narrowed to a
//! device type. Callers never read payload offsets themselves: requests are
//! built from named field values and responses decode into [`Response`].

pub mod command;
pub mod message;
pub mod schema;
pub mod table;

use std::fmt;

pub use command::Command;
pub use message::{AccessoryInfo, ReadyAck, Response, TransferComplete, VersionInfo};
pub use schema::{Field, FieldKind, FieldValue, Fields, RegistryError, Schema};

use crate::protocol::{DeviceType, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host to printer.
    Request,
    /// Printer to host.
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => write!(f, "request"),
            Direction::Response => write!(f, "response"),
        }
    }
}

/// Which device types an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMatch {
    Any,
    Only(DeviceType),
}

impl DeviceMatch {
    fn matches(self, device: DeviceType) -> bool {
        match self {
            DeviceMatch::Any => true,
            DeviceMatch::Only(d) => d == device,
        }
    }
}

/// Tag naming the typed variant a response schema decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ack,
    ReadyAck,
    PrintFinished,
    AccessoryInfo,
    Version,
    MinorVersion,
    UpdateMode,
    UpgradeStatus,
    DeviceError,
    PrintProgress,
    BatteryStatus,
    DeviceName,
    PaperType,
    BatteryLevel,
    AutoPowerOff,
    TransferComplete,
}

/// One registry row.
#[derive(Debug)]
pub struct Entry {
    pub command: Command,
    pub sub_command: u8,
    pub direction: Direction,
    pub device: DeviceMatch,
    pub name: &'static str,
    /// Set for responses only.
    pub kind: Option<MessageKind>,
    pub schema: Schema,
}

impl Entry {
    pub fn key(&self) -> (u8, u8) {
        (self.command.code(), self.sub_command)
    }
}

/// Find the entry for a pair. A device-specific row wins over a generic one.
pub fn lookup(
    command: u8,
    sub_command: u8,
    direction: Direction,
    device: DeviceType,
) -> Option<&'static Entry> {
    let mut generic = None;
    for entry in table::ENTRIES.iter().filter(|e| {
        e.command.code() == command
            && e.sub_command == sub_command
            && e.direction == direction
            && e.device.matches(device)
    }) {
        match entry.device {
            DeviceMatch::Only(_) => return Some(entry),
            DeviceMatch::Any => {
                generic.get_or_insert(entry);
            }
        }
    }
    generic
}

fn require(
    command: u8,
    sub_command: u8,
    direction: Direction,
    device: DeviceType,
) -> Result<&'static Entry, RegistryError> {
    lookup(command, sub_command, direction, device).ok_or(RegistryError::UnknownMessage {
        command,
        sub_command,
        direction,
    })
}

/// Build a request frame from named field values.
pub fn encode_request(
    command: Command,
    sub_command: u8,
    device: DeviceType,
    values: &[(&str, FieldValue)],
) -> Result<Frame, RegistryError> {
    let entry = require(command.code(), sub_command, Direction::Request, device)?;
    let payload = entry.schema.encode_payload(values)?;
    Frame::encode(command.code(), sub_command, device, &payload).map_err(|e| {
        RegistryError::Overflow {
            name: entry.name.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Look up the response schema for `frame` and decode its fields.
pub fn decode_response(
    frame: &Frame,
    device: DeviceType,
) -> Result<(&'static Entry, Fields), RegistryError> {
    let entry = require(
        frame.command(),
        frame.sub_command(),
        Direction::Response,
        device,
    )?;
    Ok((entry, entry.schema.decode(frame)))
}

/// Response kind for a received pair, if the registry knows it.
pub fn response_kind(command: u8, sub_command: u8, device: DeviceType) -> Option<MessageKind> {
    lookup(command, sub_command, Direction::Response, device).and_then(|e| e.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::*;

    #[test]
    fn test_print_ready_bytes() {
        let frame = encode_request(
            Command::Print,
            PRINT_READY,
            DeviceType::Standard,
            &[
                ("image_size", FieldValue::Size(50_000)),
                ("copies", FieldValue::U8(2)),
            ],
        )
        .unwrap();
        assert_eq!(&frame.as_bytes()[8..12], &[0x00, 0xC3, 0x50, 0x02]);
        assert_eq!(frame.key(), (0x00, 0x00));
    }

    #[test]
    fn test_slim_version_offset() {
        let std_entry = lookup(0x02, FIRMWARE_VERSION, Direction::Response, DeviceType::Standard)
            .unwrap();
        let slim_entry =
            lookup(0x02, FIRMWARE_VERSION, Direction::Response, DeviceType::Slim).unwrap();
        assert_eq!(std_entry.schema.field("printer_version").unwrap().offset, 8);
        assert_eq!(slim_entry.schema.field("printer_version").unwrap().offset, 5);

        let minor = lookup(0x02, FIRMWARE_MINOR_VERSION, Direction::Response, DeviceType::Slim)
            .unwrap();
        assert_eq!(minor.schema.field("printer_version").unwrap().offset, 5);
    }

    #[test]
    fn test_request_and_response_differ() {
        let req = lookup(0x00, PRINT_READY, Direction::Request, DeviceType::Standard).unwrap();
        let resp = lookup(0x00, PRINT_READY, Direction::Response, DeviceType::Standard).unwrap();
        assert!(req.schema.field("copies").is_some());
        assert!(resp.schema.field("max_payload").is_some());
        assert_eq!(req.kind, None);
        assert_eq!(resp.kind, Some(MessageKind::ReadyAck));
    }

    #[test]
    fn test_request_fields_inside_payload() {
        for entry in table::ENTRIES.iter().filter(|e| e.direction == Direction::Request) {
            for field in entry.schema.fields {
                assert!(field.offset >= PAYLOAD_OFFSET, "{}.{}", entry.name, field.name);
                assert!(field.end() <= FRAME_LEN, "{}.{}", entry.name, field.name);
            }
        }
    }

    #[test]
    fn test_response_fields_inside_frame() {
        for entry in table::ENTRIES.iter().filter(|e| e.direction == Direction::Response) {
            assert!(entry.kind.is_some(), "{}", entry.name);
            for field in entry.schema.fields {
                assert!(field.offset >= DEVICE_TYPE_OFFSET, "{}.{}", entry.name, field.name);
                assert!(field.end() <= FRAME_LEN, "{}.{}", entry.name, field.name);
            }
        }
    }

    #[test]
    fn test_unknown_pair() {
        let err = encode_request(Command::Error, NOTIFY, DeviceType::Standard, &[]).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownMessage { command: 0x04, .. }));
        assert_eq!(response_kind(0x0D, 0x7F, DeviceType::Standard), None);
    }
}
