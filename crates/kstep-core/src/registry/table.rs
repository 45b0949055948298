//! The schema table.
//!
//! Adding a message is a new row here plus, for responses, a [`MessageKind`]
//! arm in `message.rs`. Offsets are absolute frame offsets.

use super::schema::{Field, FieldKind, Schema};
use super::{Command, DeviceMatch, Direction, Entry, MessageKind};
use crate::protocol::DeviceType;
use crate::protocol::constants::*;

use FieldKind::{Ascii, Mac, Size, U8, U16, Version};

const fn request(
    command: Command,
    sub_command: u8,
    name: &'static str,
    fields: &'static [Field],
) -> Entry {
    Entry {
        command,
        sub_command,
        direction: Direction::Request,
        device: DeviceMatch::Any,
        name,
        kind: None,
        schema: Schema::new(fields),
    }
}

const fn response(
    command: Command,
    sub_command: u8,
    name: &'static str,
    kind: MessageKind,
    fields: &'static [Field],
) -> Entry {
    response_for(command, sub_command, DeviceMatch::Any, name, kind, fields)
}

const fn response_for(
    command: Command,
    sub_command: u8,
    device: DeviceMatch,
    name: &'static str,
    kind: MessageKind,
    fields: &'static [Field],
) -> Entry {
    Entry {
        command,
        sub_command,
        direction: Direction::Response,
        device,
        name,
        kind: Some(kind),
        schema: Schema::new(fields),
    }
}

// ============================================================================
// Shared layouts
// ============================================================================

const NONE: &[Field] = &[];

const STATUS: &[Field] = &[Field::new("error", 8, U8)];

const READY_ACK: &[Field] = &[
    Field::new("error", 8, U8),
    Field::new("transfer_type", 9, U8),
    Field::new("max_payload", 10, U16),
];

const SIZED_READY: &[Field] = &[Field::new("image_size", 8, Size)];

const VERSION_STANDARD: &[Field] = &[
    Field::new("printer_version", 8, U8),
    Field::new("firmware", 9, Version),
    Field::new("cnx", 12, Version),
    Field::new("tmd", 15, Version),
];

// SLIM firmware moves the printer version into byte 5 and packs the
// triples from the start of the payload.
const VERSION_SLIM: &[Field] = &[
    Field::new("printer_version", 5, U8),
    Field::new("firmware", 8, Version),
    Field::new("cnx", 11, Version),
    Field::new("tmd", 14, Version),
];

const PRINT_READY_REQ: &[Field] = &[
    Field::new("image_size", 8, Size),
    Field::new("copies", 11, U8),
];

const ACCESSORY: &[Field] = &[
    Field::new("error", 8, U8),
    Field::new("battery_level", 9, U8),
    Field::new("auto_power_off", 10, U8),
    Field::new("paper_count", 11, U16),
    Field::new("mac", 13, Mac),
];

const UPDATE_MODE_REQ: &[Field] = &[Field::new("update_type", 8, U8)];

const UPGRADE_READY_REQ: &[Field] = &[
    Field::new("image_size", 8, Size),
    Field::new("update_type", 11, U8),
];

const PERCENT: &[Field] = &[Field::new("percent", 8, U8)];

const BATTERY_STATUS: &[Field] = &[Field::new("charging", 8, U8), Field::new("level", 9, U8)];

const NAME_READY_REQ: &[Field] = &[Field::new("name_size", 8, Size)];

const NAME: &[Field] = &[Field::new("name", 8, Ascii(18))];

const PAPER_TYPE: &[Field] = &[
    Field::new("error", 8, U8),
    Field::new("paper_type", 9, U8),
];

const LEVEL: &[Field] = &[Field::new("error", 8, U8), Field::new("level", 9, U8)];

const MINUTES: &[Field] = &[Field::new("error", 8, U8), Field::new("minutes", 9, U8)];

const MINUTES_REQ: &[Field] = &[Field::new("minutes", 8, U8)];

const CHUNK_HEADER: &[Field] = &[
    Field::new("chunk_size", 8, U16),
    Field::new("transfer_type", 10, U8),
];

const TRANSFER_COMPLETE: &[Field] = &[
    Field::new("error", 8, U8),
    Field::new("transfer_type", 9, U8),
    Field::new("received", 10, Size),
];

// ============================================================================
// Table
// ============================================================================

pub static ENTRIES: &[Entry] = &[
    // Print
    request(Command::Print, PRINT_READY, "print_ready", PRINT_READY_REQ),
    response(
        Command::Print,
        PRINT_READY,
        "print_ready_ack",
        MessageKind::ReadyAck,
        READY_ACK,
    ),
    response(
        Command::Print,
        PRINT_FINISHED,
        "print_finished",
        MessageKind::PrintFinished,
        STATUS,
    ),
    request(Command::Print, PRINT_CANCEL, "print_cancel", NONE),
    response(
        Command::Print,
        PRINT_CANCEL,
        "print_cancel_ack",
        MessageKind::Ack,
        STATUS,
    ),
    // Accessory
    request(Command::Accessory, ACCESSORY_INFO, "accessory_info", NONE),
    response(
        Command::Accessory,
        ACCESSORY_INFO,
        "accessory_info",
        MessageKind::AccessoryInfo,
        ACCESSORY,
    ),
    // Firmware
    request(
        Command::Firmware,
        FIRMWARE_VERSION,
        "firmware_version",
        NONE,
    ),
    response_for(
        Command::Firmware,
        FIRMWARE_VERSION,
        DeviceMatch::Only(DeviceType::Standard),
        "firmware_version",
        MessageKind::Version,
        VERSION_STANDARD,
    ),
    response_for(
        Command::Firmware,
        FIRMWARE_VERSION,
        DeviceMatch::Only(DeviceType::Slim),
        "firmware_version_slim",
        MessageKind::Version,
        VERSION_SLIM,
    ),
    request(
        Command::Firmware,
        FIRMWARE_MINOR_VERSION,
        "firmware_minor_version",
        NONE,
    ),
    response_for(
        Command::Firmware,
        FIRMWARE_MINOR_VERSION,
        DeviceMatch::Only(DeviceType::Standard),
        "firmware_minor_version",
        MessageKind::MinorVersion,
        VERSION_STANDARD,
    ),
    response_for(
        Command::Firmware,
        FIRMWARE_MINOR_VERSION,
        DeviceMatch::Only(DeviceType::Slim),
        "firmware_minor_version_slim",
        MessageKind::MinorVersion,
        VERSION_SLIM,
    ),
    // Upgrade
    request(
        Command::Upgrade,
        UPGRADE_ENTER_UPDATE_MODE,
        "enter_update_mode",
        UPDATE_MODE_REQ,
    ),
    response(
        Command::Upgrade,
        UPGRADE_ENTER_UPDATE_MODE,
        "enter_update_mode_ack",
        MessageKind::UpdateMode,
        STATUS,
    ),
    request(
        Command::Upgrade,
        UPGRADE_READY,
        "upgrade_ready",
        UPGRADE_READY_REQ,
    ),
    response(
        Command::Upgrade,
        UPGRADE_READY,
        "upgrade_ready_ack",
        MessageKind::ReadyAck,
        READY_ACK,
    ),
    response(
        Command::Upgrade,
        UPGRADE_STATUS,
        "upgrade_status",
        MessageKind::UpgradeStatus,
        STATUS,
    ),
    // Notifications
    response(
        Command::Error,
        NOTIFY,
        "device_error",
        MessageKind::DeviceError,
        STATUS,
    ),
    response(
        Command::Progress,
        NOTIFY,
        "print_progress",
        MessageKind::PrintProgress,
        PERCENT,
    ),
    response(
        Command::Battery,
        NOTIFY,
        "battery_status",
        MessageKind::BatteryStatus,
        BATTERY_STATUS,
    ),
    // Device name
    request(
        Command::DeviceName,
        DEVICE_NAME_READY,
        "device_name_ready",
        NAME_READY_REQ,
    ),
    response(
        Command::DeviceName,
        DEVICE_NAME_READY,
        "device_name_ready_ack",
        MessageKind::ReadyAck,
        READY_ACK,
    ),
    request(Command::DeviceName, DEVICE_NAME_GET, "device_name", NONE),
    response(
        Command::DeviceName,
        DEVICE_NAME_GET,
        "device_name",
        MessageKind::DeviceName,
        NAME,
    ),
    // Sticker / Border
    request(
        Command::Sticker,
        STICKER_READY,
        "sticker_ready",
        SIZED_READY,
    ),
    response(
        Command::Sticker,
        STICKER_READY,
        "sticker_ready_ack",
        MessageKind::ReadyAck,
        READY_ACK,
    ),
    request(Command::Border, BORDER_READY, "border_ready", SIZED_READY),
    response(
        Command::Border,
        BORDER_READY,
        "border_ready_ack",
        MessageKind::ReadyAck,
        READY_ACK,
    ),
    // Simple getters
    request(Command::PaperType, GET, "paper_type", NONE),
    response(
        Command::PaperType,
        GET,
        "paper_type",
        MessageKind::PaperType,
        PAPER_TYPE,
    ),
    request(Command::BatteryLevel, GET, "battery_level", NONE),
    response(
        Command::BatteryLevel,
        GET,
        "battery_level",
        MessageKind::BatteryLevel,
        LEVEL,
    ),
    request(Command::AutoPowerOff, GET, "auto_power_off", NONE),
    response(
        Command::AutoPowerOff,
        GET,
        "auto_power_off",
        MessageKind::AutoPowerOff,
        MINUTES,
    ),
    request(
        Command::AutoPowerOff,
        AUTO_POWER_OFF_SET,
        "set_auto_power_off",
        MINUTES_REQ,
    ),
    response(
        Command::AutoPowerOff,
        AUTO_POWER_OFF_SET,
        "set_auto_power_off_ack",
        MessageKind::Ack,
        STATUS,
    ),
    // Bulk upload
    request(Command::Upload, UPLOAD_CHUNK, "upload_chunk", CHUNK_HEADER),
    response(
        Command::Upload,
        UPLOAD_COMPLETE,
        "transfer_complete",
        MessageKind::TransferComplete,
        TRANSFER_COMPLETE,
    ),
];
