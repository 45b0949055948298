//! Event system for UI decoupling.
//!
//! Front-ends subscribe to session events through [`StepObserver`] without
//! reaching into the dispatcher.

use std::fmt;

use crate::protocol::{DeviceErrorCode, Frame};
use crate::state::SessionState;
use crate::transfer::TransferKind;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by a printer session.
#[derive(Debug, Clone)]
pub enum StepEvent {
    /// Session state changed.
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Frame sent or received. Bulk data following a chunk header is counted
    /// in `extra` but not included.
    Packet {
        direction: PacketDirection,
        frame: Frame,
        extra: usize,
    },
    /// Frame that matched no pending request.
    Unsolicited { frame: Frame },
    /// Progress of a running transfer.
    TransferProgress {
        kind: TransferKind,
        sent: u32,
        total: u32,
        percent: u8,
    },
    /// Device reported a non-zero status.
    DeviceError { code: DeviceErrorCode },
    /// Log message.
    Log { level: LogLevel, message: String },
}

/// Frame direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Printer
    Rx, // Printer -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving session events.
///
/// Called from both the caller's thread and the reader thread, so
/// implementations must not block.
pub trait StepObserver: Send + Sync {
    fn on_event(&self, event: &StepEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl StepObserver for NullObserver {
    fn on_event(&self, _event: &StepEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl StepObserver for TracingObserver {
    fn on_event(&self, event: &StepEvent) {
        match event {
            StepEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Session state changed");
            }
            StepEvent::Packet {
                direction,
                frame,
                extra,
            } => {
                tracing::trace!(dir = %direction, frame = ?frame, extra = extra, "Packet");
            }
            StepEvent::Unsolicited { frame } => {
                tracing::debug!(frame = ?frame, "Unsolicited frame");
            }
            StepEvent::TransferProgress {
                kind,
                sent,
                total,
                percent,
            } => {
                tracing::debug!(kind = %kind, sent = sent, total = total, progress = %format!("{}%", percent), "Transfer progress");
            }
            StepEvent::DeviceError { code } => {
                tracing::error!(code = %code, "Device error");
            }
            StepEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}
