//! Command bytes (frame offset 6).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Print,
    Accessory,
    Firmware,
    Upgrade,
    Error,
    Progress,
    Battery,
    DeviceName,
    Sticker,
    Border,
    PaperType,
    BatteryLevel,
    AutoPowerOff,
    Upload,
}

impl Command {
    pub const ALL: [Command; 14] = [
        Command::Print,
        Command::Accessory,
        Command::Firmware,
        Command::Upgrade,
        Command::Error,
        Command::Progress,
        Command::Battery,
        Command::DeviceName,
        Command::Sticker,
        Command::Border,
        Command::PaperType,
        Command::BatteryLevel,
        Command::AutoPowerOff,
        Command::Upload,
    ];

    pub const fn code(self) -> u8 {
        match self {
            Command::Print => 0x00,
            Command::Accessory => 0x01,
            Command::Firmware => 0x02,
            Command::Upgrade => 0x03,
            Command::Error => 0x04,
            Command::Progress => 0x05,
            Command::Battery => 0x06,
            Command::DeviceName => 0x07,
            Command::Sticker => 0x08,
            Command::Border => 0x09,
            Command::PaperType => 0x0A,
            Command::BatteryLevel => 0x0B,
            Command::AutoPowerOff => 0x0C,
            Command::Upload => 0x0D,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
