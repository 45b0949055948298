//! High-level printer API.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::SessionConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Result, StepError};
use crate::events::{StepObserver, TracingObserver};
use crate::protocol::constants::*;
use crate::protocol::Frame;
use crate::registry::{self, AccessoryInfo, Command, FieldValue, Response, VersionInfo};
use crate::state::{SessionInput, SessionState};
use crate::transfer::driver::check_status;
use crate::transfer::{CancelToken, PrintJob, Transfer, TransferKind};
use crate::transport::{Transport, TransportError};

/// States in which ordinary queries may be issued.
const ONLINE: &[SessionState] = &[
    SessionState::Connected,
    SessionState::Printing,
    SessionState::Upgrading,
];

/// One session with a KODAK STEP printer over an already-open link.
///
/// Methods take `&self`; queries may be issued from another thread while a
/// transfer is running.
pub struct StepPrinter<T: Transport + 'static, O: StepObserver + 'static = TracingObserver> {
    dispatcher: Dispatcher<T, O>,
}

impl<T: Transport + 'static> StepPrinter<T, TracingObserver> {
    /// Create a session with the default tracing observer.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }
}

impl<T: Transport + 'static, O: StepObserver + 'static> StepPrinter<T, O> {
    /// Create a session with a custom observer.
    pub fn with_observer(transport: T, config: SessionConfig, observer: Arc<O>) -> Self {
        Self {
            dispatcher: Dispatcher::new(Arc::new(transport), observer, config),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        self.dispatcher.config()
    }

    pub fn observer(&self) -> &O {
        self.dispatcher.observer()
    }

    /// Snapshot of the session state.
    pub fn current_state(&self) -> SessionState {
        self.dispatcher.state()
    }

    pub fn in_update_mode(&self) -> bool {
        self.dispatcher.in_update_mode()
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Start the reader and run the accessory-info handshake.
    #[instrument(skip(self))]
    pub fn connect(&self) -> Result<AccessoryInfo> {
        let d = &self.dispatcher;
        d.require(&[SessionState::Disconnected], "connect")?;
        if !d.transport_alive() {
            return Err(TransportError::Disconnected.into());
        }

        d.apply(SessionInput::ConnectStarted)?;
        if let Err(e) = d.start() {
            self.fail_handshake();
            return Err(e);
        }

        match self.handshake() {
            Ok(info) => {
                d.apply(SessionInput::HandshakeSucceeded)?;
                info!(
                    device = %self.config().device_type,
                    battery = info.battery_level,
                    mac = %info.mac_string(),
                    "Printer connected"
                );
                Ok(info)
            }
            Err(e) => {
                self.fail_handshake();
                Err(e)
            }
        }
    }

    fn handshake(&self) -> Result<AccessoryInfo> {
        let d = &self.dispatcher;
        let frame = self.request_frame(Command::Accessory, ACCESSORY_INFO, &[])?;
        let ticket = d.register_with_device_errors(Command::Accessory, ACCESSORY_INFO)?;
        d.send_frame(&frame)?;
        match ticket.wait(d.operation_timeout())? {
            Response::AccessoryInfo(info) => {
                check_status(d, info.error)?;
                Ok(info)
            }
            Response::DeviceError { error } => Err(StepError::Device(error)),
            other => Err(unexpected(&other, "accessory info")),
        }
    }

    fn fail_handshake(&self) {
        // Already Disconnected when the handshake timed out.
        let _ = self.dispatcher.apply(SessionInput::HandshakeFailed);
        self.dispatcher.stop();
    }

    /// Stop the reader and fail anything still pending.
    #[instrument(skip(self))]
    pub fn disconnect(&self) {
        self.dispatcher.stop();
        info!("Printer disconnected");
    }

    /// Send a raw request and wait for the response on the same pair.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn send(&self, command: Command, sub_command: u8, payload: &[u8]) -> Result<Response> {
        let d = &self.dispatcher;
        d.require(ONLINE, "send")?;
        let frame = Frame::encode(command.code(), sub_command, self.config().device_type, payload)
            .map_err(|e| StepError::InvalidInput(e.to_string()))?;
        let ticket = d.request(&frame)?;
        ticket.wait(d.operation_timeout())
    }

    fn request_frame(
        &self,
        command: Command,
        sub_command: u8,
        values: &[(&str, FieldValue)],
    ) -> Result<Frame> {
        Ok(registry::encode_request(
            command,
            sub_command,
            self.config().device_type,
            values,
        )?)
    }

    fn query(
        &self,
        command: Command,
        sub_command: u8,
        values: &[(&str, FieldValue)],
        operation: &'static str,
    ) -> Result<Response> {
        let d = &self.dispatcher;
        d.require(ONLINE, operation)?;
        let frame = self.request_frame(command, sub_command, values)?;
        let ticket = d.request(&frame)?;
        ticket.wait(d.operation_timeout())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[instrument(skip(self))]
    pub fn get_accessory_info(&self) -> Result<AccessoryInfo> {
        match self.query(Command::Accessory, ACCESSORY_INFO, &[], "get accessory info")? {
            Response::AccessoryInfo(info) => {
                check_status(&self.dispatcher, info.error)?;
                Ok(info)
            }
            other => Err(unexpected(&other, "accessory info")),
        }
    }

    #[instrument(skip(self))]
    pub fn get_firmware_version(&self) -> Result<VersionInfo> {
        match self.query(Command::Firmware, FIRMWARE_VERSION, &[], "get firmware version")? {
            Response::Version(v) => Ok(v),
            other => Err(unexpected(&other, "firmware version")),
        }
    }

    #[instrument(skip(self))]
    pub fn get_firmware_minor_version(&self) -> Result<VersionInfo> {
        match self.query(
            Command::Firmware,
            FIRMWARE_MINOR_VERSION,
            &[],
            "get firmware minor version",
        )? {
            Response::MinorVersion(v) => Ok(v),
            other => Err(unexpected(&other, "firmware minor version")),
        }
    }

    /// Battery charge in percent.
    #[instrument(skip(self))]
    pub fn get_battery_level(&self) -> Result<u8> {
        match self.query(Command::BatteryLevel, GET, &[], "get battery level")? {
            Response::BatteryLevel { error, level } => {
                check_status(&self.dispatcher, error)?;
                Ok(level)
            }
            other => Err(unexpected(&other, "battery level")),
        }
    }

    #[instrument(skip(self))]
    pub fn get_paper_type(&self) -> Result<u8> {
        match self.query(Command::PaperType, GET, &[], "get paper type")? {
            Response::PaperType { error, paper_type } => {
                check_status(&self.dispatcher, error)?;
                Ok(paper_type)
            }
            other => Err(unexpected(&other, "paper type")),
        }
    }

    /// Auto power-off delay in minutes.
    #[instrument(skip(self))]
    pub fn get_auto_power_off(&self) -> Result<u8> {
        match self.query(Command::AutoPowerOff, GET, &[], "get auto power off")? {
            Response::AutoPowerOff { error, minutes } => {
                check_status(&self.dispatcher, error)?;
                Ok(minutes)
            }
            other => Err(unexpected(&other, "auto power off")),
        }
    }

    #[instrument(skip(self))]
    pub fn set_auto_power_off(&self, minutes: u8) -> Result<()> {
        let response = self.query(
            Command::AutoPowerOff,
            AUTO_POWER_OFF_SET,
            &[("minutes", FieldValue::U8(minutes))],
            "set auto power off",
        )?;
        self.expect_ack(response, "auto power off")
    }

    #[instrument(skip(self))]
    pub fn get_device_name(&self) -> Result<String> {
        match self.query(Command::DeviceName, DEVICE_NAME_GET, &[], "get device name")? {
            Response::DeviceName { name } => Ok(name),
            other => Err(unexpected(&other, "device name")),
        }
    }

    fn expect_ack(&self, response: Response, what: &str) -> Result<()> {
        match response {
            Response::Ack { error } => check_status(&self.dispatcher, error),
            other => Err(unexpected(&other, what)),
        }
    }

    // ========================================================================
    // Printing
    // ========================================================================

    /// Announce a print job. On acceptance the session moves to Printing
    /// and the printer waits for `image_size` bytes of image data, which go
    /// out through [`PrintJob::send_image`].
    #[instrument(skip(self))]
    pub fn request_print(&self, image_size: u32, copies: u8) -> Result<PrintJob<'_, T, O>> {
        let d = &self.dispatcher;
        d.require(&[SessionState::Connected], "request print")?;
        if image_size == 0 || image_size > MAX_U24 {
            return Err(StepError::InvalidInput(format!(
                "image size {} outside 1..={}",
                image_size, MAX_U24
            )));
        }
        PrintJob::new(d, image_size, copies)
    }

    /// Abort the current print and return to Connected.
    #[instrument(skip(self))]
    pub fn cancel_print(&self) -> Result<()> {
        let d = &self.dispatcher;
        d.require(&[SessionState::Printing], "cancel print")?;
        let frame = self.request_frame(Command::Print, PRINT_CANCEL, &[])?;
        let result = d
            .request(&frame)
            .and_then(|ticket| ticket.wait(d.operation_timeout()))
            .and_then(|response| self.expect_ack(response, "print cancel"));
        let _ = d.apply(SessionInput::OperationAborted);
        info!("Print cancelled");
        result
    }

    /// Print a JPEG-encoded image, blocking until the printer reports the
    /// job finished.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn print_image(&self, data: &[u8], copies: u8) -> Result<()> {
        self.start_transfer(TransferKind::Image { copies }, data)?.run()
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Begin a transfer. Nothing is sent until the returned iterator is
    /// first advanced.
    pub fn start_transfer<'a>(
        &'a self,
        kind: TransferKind,
        data: &'a [u8],
    ) -> Result<Transfer<'a, T, O>> {
        self.start_transfer_with_cancel(kind, data, CancelToken::new())
    }

    pub fn start_transfer_with_cancel<'a>(
        &'a self,
        kind: TransferKind,
        data: &'a [u8],
        cancel: CancelToken,
    ) -> Result<Transfer<'a, T, O>> {
        let d = &self.dispatcher;
        d.require(&[SessionState::Connected], "start transfer")?;
        if matches!(kind, TransferKind::Firmware { .. }) && !d.in_update_mode() {
            return Err(StepError::InvalidState {
                state: d.state(),
                operation: "upgrade firmware outside update mode",
            });
        }
        Transfer::new(d, kind, data, cancel)
    }

    /// Switch the printer into firmware update mode.
    #[instrument(skip(self))]
    pub fn enter_firmware_update(&self, update_type: u8) -> Result<()> {
        let d = &self.dispatcher;
        d.require(&[SessionState::Connected], "enter firmware update")?;
        let frame = self.request_frame(
            Command::Upgrade,
            UPGRADE_ENTER_UPDATE_MODE,
            &[("update_type", FieldValue::U8(update_type))],
        )?;
        match d.request(&frame)?.wait(d.operation_timeout())? {
            Response::UpdateMode { error } => check_status(d, error)?,
            other => return Err(unexpected(&other, "update mode")),
        }
        d.apply(SessionInput::UpdateModeEntered)?;
        info!(update_type = update_type, "Update mode entered");
        Ok(())
    }

    /// Send a firmware image. Requires [`StepPrinter::enter_firmware_update`].
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn upgrade_firmware(&self, data: &[u8], update_type: u8) -> Result<()> {
        self.start_transfer(TransferKind::Firmware { update_type }, data)?.run()
    }

    #[instrument(skip(self, name), fields(len = name.len()))]
    pub fn set_device_name(&self, name: &[u8]) -> Result<()> {
        self.start_transfer(TransferKind::DeviceName, name)?.run()
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn send_sticker(&self, data: &[u8]) -> Result<()> {
        self.start_transfer(TransferKind::Sticker, data)?.run()
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn send_border(&self, data: &[u8]) -> Result<()> {
        self.start_transfer(TransferKind::Border, data)?.run()
    }
}

fn unexpected(response: &Response, wanted: &str) -> StepError {
    StepError::ProtocolViolation(format!(
        "expected {} response, got {:?}",
        wanted,
        response.kind()
    ))
}
