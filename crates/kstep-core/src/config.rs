//! Per-session configuration.

use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::protocol::DeviceType;
use crate::protocol::constants::*;

/// Configuration for a printer session. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Printer family; decides the device-type byte and response layouts.
    pub device_type: DeviceType,
    /// Deadline for any request outside a print.
    pub operation_timeout_ms: u64,
    /// Deadline while Printing.
    pub print_timeout_ms: u64,
    /// Abort a chunked transfer after this long without progress.
    pub stale_transfer_timeout_ms: u64,
    /// Delay between bulk chunks.
    pub pacing_delay_ms: u64,
    /// How long a late response to a cancelled request is swallowed.
    pub late_frame_window_ms: u64,
    /// Bytes requested per transport read.
    pub read_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Standard,
            operation_timeout_ms: OPERATION_TIMEOUT.as_millis() as u64,
            print_timeout_ms: PRINT_TIMEOUT.as_millis() as u64,
            stale_transfer_timeout_ms: STALE_TRANSFER_TIMEOUT.as_millis() as u64,
            pacing_delay_ms: PACING_DELAY.as_millis() as u64,
            late_frame_window_ms: LATE_FRAME_WINDOW.as_millis() as u64,
            read_size: READ_CHUNK,
        }
    }
}

impl SessionConfig {
    /// Defaults for the given printer family.
    pub fn for_device(device_type: DeviceType) -> Self {
        Self {
            device_type,
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.operation_timeout_ms == 0 || self.print_timeout_ms == 0 {
            bail!("timeouts must be non-zero");
        }
        if self.read_size == 0 {
            bail!("read_size must be non-zero");
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_millis(self.print_timeout_ms)
    }

    pub fn stale_transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_transfer_timeout_ms)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn late_frame_window(&self) -> Duration {
        Duration::from_millis(self.late_frame_window_ms)
    }
}
