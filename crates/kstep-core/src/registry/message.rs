//! Typed responses.

use super::schema::{Fields, RegistryError};
use super::{MessageKind, decode_response};
use crate::protocol::{DeviceErrorCode, DeviceType, Frame, Version};

/// Answer to any sized "ready" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyAck {
    pub error: DeviceErrorCode,
    pub transfer_type: u8,
    /// Only meaningful when `error` is success.
    pub max_payload: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub error: DeviceErrorCode,
    pub battery_level: u8,
    /// Minutes; zero means never.
    pub auto_power_off: u8,
    pub paper_count: u16,
    pub mac: [u8; 6],
}

impl AccessoryInfo {
    pub fn mac_string(&self) -> String {
        self.mac
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub printer_version: u8,
    pub firmware: Version,
    pub cnx: Version,
    pub tmd: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferComplete {
    pub error: DeviceErrorCode,
    pub transfer_type: u8,
    pub received: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack { error: DeviceErrorCode },
    ReadyAck(ReadyAck),
    PrintFinished { error: DeviceErrorCode },
    AccessoryInfo(AccessoryInfo),
    Version(VersionInfo),
    MinorVersion(VersionInfo),
    UpdateMode { error: DeviceErrorCode },
    UpgradeStatus { error: DeviceErrorCode },
    DeviceError { error: DeviceErrorCode },
    PrintProgress { percent: u8 },
    BatteryStatus { charging: bool, level: u8 },
    DeviceName { name: String },
    PaperType { error: DeviceErrorCode, paper_type: u8 },
    BatteryLevel { error: DeviceErrorCode, level: u8 },
    AutoPowerOff { error: DeviceErrorCode, minutes: u8 },
    TransferComplete(TransferComplete),
}

impl Response {
    /// Decode a received frame through the registry.
    pub fn decode(frame: &Frame, device: DeviceType) -> Result<Self, RegistryError> {
        let (entry, fields) = decode_response(frame, device)?;
        let kind = entry.kind.ok_or(RegistryError::UnknownMessage {
            command: frame.command(),
            sub_command: frame.sub_command(),
            direction: entry.direction,
        })?;
        Self::from_fields(kind, &fields)
    }

    pub fn from_fields(kind: MessageKind, f: &Fields) -> Result<Self, RegistryError> {
        let error = || f.u8("error").map(DeviceErrorCode::new);
        let version = || -> Result<VersionInfo, RegistryError> {
            Ok(VersionInfo {
                printer_version: f.u8("printer_version")?,
                firmware: f.version("firmware")?,
                cnx: f.version("cnx")?,
                tmd: f.version("tmd")?,
            })
        };

        Ok(match kind {
            MessageKind::Ack => Response::Ack { error: error()? },
            MessageKind::ReadyAck => Response::ReadyAck(ReadyAck {
                error: error()?,
                transfer_type: f.u8("transfer_type")?,
                max_payload: f.u16("max_payload")?,
            }),
            MessageKind::PrintFinished => Response::PrintFinished { error: error()? },
            MessageKind::AccessoryInfo => Response::AccessoryInfo(AccessoryInfo {
                error: error()?,
                battery_level: f.u8("battery_level")?,
                auto_power_off: f.u8("auto_power_off")?,
                paper_count: f.u16("paper_count")?,
                mac: f.mac("mac")?,
            }),
            MessageKind::Version => Response::Version(version()?),
            MessageKind::MinorVersion => Response::MinorVersion(version()?),
            MessageKind::UpdateMode => Response::UpdateMode { error: error()? },
            MessageKind::UpgradeStatus => Response::UpgradeStatus { error: error()? },
            MessageKind::DeviceError => Response::DeviceError { error: error()? },
            MessageKind::PrintProgress => Response::PrintProgress {
                percent: f.u8("percent")?,
            },
            MessageKind::BatteryStatus => Response::BatteryStatus {
                charging: f.u8("charging")? != 0,
                level: f.u8("level")?,
            },
            MessageKind::DeviceName => Response::DeviceName {
                name: f.ascii("name")?.to_string(),
            },
            MessageKind::PaperType => Response::PaperType {
                error: error()?,
                paper_type: f.u8("paper_type")?,
            },
            MessageKind::BatteryLevel => Response::BatteryLevel {
                error: error()?,
                level: f.u8("level")?,
            },
            MessageKind::AutoPowerOff => Response::AutoPowerOff {
                error: error()?,
                minutes: f.u8("minutes")?,
            },
            MessageKind::TransferComplete => Response::TransferComplete(TransferComplete {
                error: error()?,
                transfer_type: f.u8("transfer_type")?,
                received: f.size("received")?,
            }),
        })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Response::Ack { .. } => MessageKind::Ack,
            Response::ReadyAck(_) => MessageKind::ReadyAck,
            Response::PrintFinished { .. } => MessageKind::PrintFinished,
            Response::AccessoryInfo(_) => MessageKind::AccessoryInfo,
            Response::Version(_) => MessageKind::Version,
            Response::MinorVersion(_) => MessageKind::MinorVersion,
            Response::UpdateMode { .. } => MessageKind::UpdateMode,
            Response::UpgradeStatus { .. } => MessageKind::UpgradeStatus,
            Response::DeviceError { .. } => MessageKind::DeviceError,
            Response::PrintProgress { .. } => MessageKind::PrintProgress,
            Response::BatteryStatus { .. } => MessageKind::BatteryStatus,
            Response::DeviceName { .. } => MessageKind::DeviceName,
            Response::PaperType { .. } => MessageKind::PaperType,
            Response::BatteryLevel { .. } => MessageKind::BatteryLevel,
            Response::AutoPowerOff { .. } => MessageKind::AutoPowerOff,
            Response::TransferComplete(_) => MessageKind::TransferComplete,
        }
    }

    /// Status byte carried by the message, if it has one.
    pub fn error(&self) -> Option<DeviceErrorCode> {
        match self {
            Response::Ack { error }
            | Response::PrintFinished { error }
            | Response::UpdateMode { error }
            | Response::UpgradeStatus { error }
            | Response::DeviceError { error }
            | Response::PaperType { error, .. }
            | Response::BatteryLevel { error, .. }
            | Response::AutoPowerOff { error, .. } => Some(*error),
            Response::ReadyAck(ack) => Some(ack.error),
            Response::AccessoryInfo(info) => Some(info.error),
            Response::TransferComplete(done) => Some(done.error),
            Response::Version(_)
            | Response::MinorVersion(_)
            | Response::PrintProgress { .. }
            | Response::BatteryStatus { .. }
            | Response::DeviceName { .. } => None,
        }
    }
}
