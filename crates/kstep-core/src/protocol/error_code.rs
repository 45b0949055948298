//! Device error codes.
//!
//! Acknowledgments and notifications carry a single status byte. Zero is
//! success; the printer documents 17 failure codes. Unknown codes are kept
//! as-is so callers always see exactly what the device sent.

use std::fmt;

/// Documented failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceFault {
    Busy = 0x01,
    PaperJam = 0x02,
    OutOfPaper = 0x03,
    PaperMismatch = 0x04,
    DataError = 0x05,
    CoverOpen = 0x06,
    SystemError = 0x07,
    BatteryLow = 0x08,
    BatteryFault = 0x09,
    HighTemperature = 0x0A,
    LowTemperature = 0x0B,
    CoolingMode = 0x0C,
    Cancelled = 0x0D,
    WrongCustomer = 0x0E,
    UpgradeFailed = 0x0F,
    InvalidFirmware = 0x10,
    NotInUpdateMode = 0x11,
}

impl DeviceFault {
    pub const ALL: [DeviceFault; 17] = [
        DeviceFault::Busy,
        DeviceFault::PaperJam,
        DeviceFault::OutOfPaper,
        DeviceFault::PaperMismatch,
        DeviceFault::DataError,
        DeviceFault::CoverOpen,
        DeviceFault::SystemError,
        DeviceFault::BatteryLow,
        DeviceFault::BatteryFault,
        DeviceFault::HighTemperature,
        DeviceFault::LowTemperature,
        DeviceFault::CoolingMode,
        DeviceFault::Cancelled,
        DeviceFault::WrongCustomer,
        DeviceFault::UpgradeFailed,
        DeviceFault::InvalidFirmware,
        DeviceFault::NotInUpdateMode,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| *f as u8 == code)
    }

    pub fn description(self) -> &'static str {
        match self {
            DeviceFault::Busy => "printer busy",
            DeviceFault::PaperJam => "paper jam",
            DeviceFault::OutOfPaper => "out of paper",
            DeviceFault::PaperMismatch => "paper type mismatch",
            DeviceFault::DataError => "data error",
            DeviceFault::CoverOpen => "cover open",
            DeviceFault::SystemError => "system error",
            DeviceFault::BatteryLow => "battery low",
            DeviceFault::BatteryFault => "battery fault",
            DeviceFault::HighTemperature => "temperature too high",
            DeviceFault::LowTemperature => "temperature too low",
            DeviceFault::CoolingMode => "cooling down",
            DeviceFault::Cancelled => "cancelled on device",
            DeviceFault::WrongCustomer => "wrong customer",
            DeviceFault::UpgradeFailed => "firmware upgrade failed",
            DeviceFault::InvalidFirmware => "invalid firmware image",
            DeviceFault::NotInUpdateMode => "not in update mode",
        }
    }
}

/// Raw status byte from the device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceErrorCode(u8);

impl DeviceErrorCode {
    pub const SUCCESS: DeviceErrorCode = DeviceErrorCode(0);

    pub const fn new(code: u8) -> Self {
        Self(code)
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Known fault, or `None` for success and undocumented codes.
    pub fn fault(self) -> Option<DeviceFault> {
        DeviceFault::from_code(self.0)
    }
}

impl From<DeviceFault> for DeviceErrorCode {
    fn from(fault: DeviceFault) -> Self {
        Self(fault as u8)
    }
}

impl fmt::Debug for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fault() {
            Some(fault) => write!(f, "DeviceErrorCode({:#04X} {:?})", self.0, fault),
            None => write!(f, "DeviceErrorCode({:#04X})", self.0),
        }
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fault() {
            Some(fault) => write!(f, "{} (code {})", fault.description(), self.0),
            None if self.is_success() => write!(f, "success"),
            None => write!(f, "unknown device error (code {})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_codes() {
        assert_eq!(DeviceFault::from_code(2), Some(DeviceFault::PaperJam));
        assert_eq!(DeviceFault::from_code(3), Some(DeviceFault::OutOfPaper));
        assert_eq!(DeviceFault::from_code(8), Some(DeviceFault::BatteryLow));
        assert_eq!(DeviceFault::ALL.len(), 17);
        assert_eq!(DeviceFault::from_code(0), None);
    }

    #[test]
    fn test_unknown_code_kept_verbatim() {
        let code = DeviceErrorCode::new(0x7F);
        assert!(!code.is_success());
        assert_eq!(code.fault(), None);
        assert_eq!(code.code(), 0x7F);
        assert_eq!(code.to_string(), "unknown device error (code 127)");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DeviceErrorCode::from(DeviceFault::OutOfPaper).to_string(),
            "out of paper (code 3)"
        );
        assert_eq!(DeviceErrorCode::SUCCESS.to_string(), "success");
    }
}
