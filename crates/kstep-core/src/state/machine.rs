//! Session state machine.

use std::fmt;
use std::time::Duration;

use crate::error::{Result, StepError};
use crate::protocol::constants::{OPERATION_TIMEOUT, PRINT_TIMEOUT};
use crate::registry::MessageKind;

/// Connection lifecycle of one printer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Handshake in flight.
    Connecting,
    Connected,
    /// Print job accepted, waiting for it to finish.
    Printing,
    /// Firmware image accepted, waiting for the status report.
    Upgrading,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "DISCONNECTED"),
            SessionState::Connecting => write!(f, "CONNECTING"),
            SessionState::Connected => write!(f, "CONNECTED"),
            SessionState::Printing => write!(f, "PRINTING"),
            SessionState::Upgrading => write!(f, "UPGRADING"),
        }
    }
}

impl SessionState {
    /// A print or upgrade is running.
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::Printing | SessionState::Upgrading)
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self, SessionState::Disconnected | SessionState::Connecting)
    }
}

/// Everything that can move the session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    ConnectStarted,
    HandshakeSucceeded,
    HandshakeFailed,
    /// The printer accepted "enter update mode".
    UpdateModeEntered,
    PrintAccepted,
    UpgradeAccepted,
    PrintEnded,
    UpgradeEnded,
    /// Cancel, device error, protocol violation or size mismatch.
    OperationAborted,
    OperationTimedOut { transport_alive: bool },
    /// Transport failure, framing error or explicit disconnect.
    TransportLost,
}

impl SessionInput {
    pub fn name(&self) -> &'static str {
        match self {
            SessionInput::ConnectStarted => "connect",
            SessionInput::HandshakeSucceeded => "handshake succeeded",
            SessionInput::HandshakeFailed => "handshake failed",
            SessionInput::UpdateModeEntered => "enter update mode",
            SessionInput::PrintAccepted => "start print",
            SessionInput::UpgradeAccepted => "start upgrade",
            SessionInput::PrintEnded => "finish print",
            SessionInput::UpgradeEnded => "finish upgrade",
            SessionInput::OperationAborted => "abort",
            SessionInput::OperationTimedOut { .. } => "timeout",
            SessionInput::TransportLost => "transport lost",
        }
    }
}

/// Result of applying an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Owns [`SessionState`]. The state only changes through [`SessionMachine::apply`].
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    /// Set once the printer acknowledged "enter update mode"; cleared when
    /// the upgrade ends or the session drops.
    update_mode: bool,
    operation_timeout: Duration,
    print_timeout: Duration,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(OPERATION_TIMEOUT, PRINT_TIMEOUT)
    }
}

impl SessionMachine {
    pub fn new(operation_timeout: Duration, print_timeout: Duration) -> Self {
        Self {
            state: SessionState::Disconnected,
            update_mode: false,
            operation_timeout,
            print_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn in_update_mode(&self) -> bool {
        self.update_mode
    }

    /// Deadline for a request issued in the current state.
    pub fn operation_timeout(&self) -> Duration {
        match self.state {
            SessionState::Printing => self.print_timeout,
            _ => self.operation_timeout,
        }
    }

    /// Fail with `InvalidState` unless the session is in one of `allowed`.
    pub fn require(&self, allowed: &[SessionState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(StepError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    /// Apply an input. Illegal inputs leave the state untouched.
    pub fn apply(&mut self, input: SessionInput) -> Result<Transition> {
        use SessionState::*;

        let from = self.state;
        let to = match (from, input) {
            (_, SessionInput::TransportLost) => Disconnected,

            (Disconnected, SessionInput::ConnectStarted) => Connecting,
            (Connecting, SessionInput::HandshakeSucceeded) => Connected,
            (Connecting, SessionInput::HandshakeFailed) => Disconnected,

            (Connected, SessionInput::UpdateModeEntered) => Connected,
            (Connected, SessionInput::PrintAccepted) => Printing,
            (Connected, SessionInput::UpgradeAccepted) if self.update_mode => Upgrading,
            (Printing, SessionInput::PrintEnded) => Connected,
            (Upgrading, SessionInput::UpgradeEnded) => Connected,

            (Disconnected, SessionInput::OperationAborted) => Disconnected,
            (Connecting, SessionInput::OperationAborted) => Disconnected,
            (_, SessionInput::OperationAborted) => Connected,

            (Disconnected | Connecting, SessionInput::OperationTimedOut { .. }) => Disconnected,
            (
                _,
                SessionInput::OperationTimedOut {
                    transport_alive: false,
                },
            ) => Disconnected,
            (_, SessionInput::OperationTimedOut { .. }) => Connected,

            (state, input) => {
                return Err(StepError::InvalidState {
                    state,
                    operation: input.name(),
                });
            }
        };

        match input {
            SessionInput::UpdateModeEntered => self.update_mode = true,
            _ if to == Disconnected || from == Upgrading => self.update_mode = false,
            _ => {}
        }

        self.goto_state(to);
        Ok(Transition { from, to })
    }

    /// Whether a correlated response of `kind` may be applied in the current
    /// state.
    pub fn admits(&self, kind: MessageKind) -> bool {
        use MessageKind::*;

        let out_of_band = matches!(
            kind,
            AccessoryInfo
                | Version
                | MinorVersion
                | DeviceError
                | BatteryStatus
                | DeviceName
                | PaperType
                | BatteryLevel
                | AutoPowerOff
        );

        match self.state {
            SessionState::Disconnected => false,
            SessionState::Connecting => matches!(kind, AccessoryInfo | DeviceError),
            SessionState::Connected => !matches!(kind, PrintFinished | UpgradeStatus),
            SessionState::Printing => {
                out_of_band || matches!(kind, PrintFinished | PrintProgress | Ack)
            }
            SessionState::Upgrading => out_of_band || matches!(kind, UpgradeStatus | Ack),
        }
    }

    fn goto_state(&mut self, new_state: SessionState) {
        if self.state != new_state {
            tracing::info!(from = %self.state, to = %new_state, "State transition");
        }
        self.state = new_state;
    }
}
