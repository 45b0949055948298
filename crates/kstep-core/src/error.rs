//! Error taxonomy for the protocol engine.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::{DeviceErrorCode, FrameError};
use crate::registry::{Command, RegistryError};
use crate::state::SessionState;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum StepError {
    /// Bad magic or truncated frame. Closes the session.
    #[error("Framing error: {0}")]
    Framing(#[from] FrameError),

    /// Packet not legal in the current session state.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Non-zero status byte from the printer, exactly as received.
    #[error("Device error: {0}")]
    Device(DeviceErrorCode),

    #[error("Transfer size mismatch: negotiated {expected} bytes, transferred {actual}")]
    TransferSizeMismatch { expected: u32, actual: u32 },

    #[error("Timeout after {}ms waiting for {what}", .after.as_millis())]
    Timeout { what: String, after: Duration },

    #[error("Request already pending for {command} sub {sub_command:#04X}")]
    RequestAlreadyPending { command: Command, sub_command: u8 },

    #[error("Operation '{operation}' not allowed while {state}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl StepError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::Timeout { .. })
    }

    /// Device status byte, for `Device` errors.
    pub fn device_code(&self) -> Option<DeviceErrorCode> {
        match self {
            StepError::Device(code) => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StepError>;
