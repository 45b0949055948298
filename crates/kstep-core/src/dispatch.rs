//! Request/response correlation over a shared transport.
//!
//! The reader thread only reassembles frames and routes them: a frame whose
//! (command, sub-command) matches a pending request goes to that request's
//! waiter, anything else is reported to the observer and dropped. The
//! protocol has no sequence numbers, so at most one request per pair may be
//! outstanding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, trace, warn};

use crate::config::SessionConfig;
use crate::error::{Result, StepError};
use crate::events::{LogLevel, PacketDirection, StepEvent, StepObserver};
use crate::protocol::{DeviceType, Frame, FrameBuffer, FrameError};
use crate::registry::{self, Command, MessageKind, Response};
use crate::state::{SessionInput, SessionMachine, SessionState, Transition};
use crate::transfer::CancelToken;
use crate::transport::{Transport, TransportError};

type Key = (u8, u8);

/// How often a cancellable wait checks its token.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Why the reader stopped.
#[derive(Debug, Clone)]
enum CloseReason {
    Framing(FrameError),
    Transport(String),
    Shutdown,
}

impl CloseReason {
    fn to_error(&self) -> StepError {
        match self {
            CloseReason::Framing(e) => StepError::Framing(e.clone()),
            CloseReason::Transport(msg) => StepError::SessionClosed(msg.clone()),
            CloseReason::Shutdown => StepError::SessionClosed("disconnected".into()),
        }
    }
}

enum Delivery {
    Frame(Frame),
    /// Matched, but not legal in the current state.
    Rejected(String),
    Closed(CloseReason),
}

struct Pending {
    id: u64,
    tx: Sender<Delivery>,
    /// Also complete on an unsolicited device error notification.
    device_errors: bool,
}

struct Inner {
    machine: SessionMachine,
    pending: HashMap<Key, Pending>,
    /// Keys of abandoned requests, with the instant their claim expires.
    tombstones: HashMap<Key, Instant>,
}

struct Shared<T, O> {
    transport: Arc<T>,
    observer: Arc<O>,
    config: SessionConfig,
    inner: Mutex<Inner>,
    write_lock: Mutex<()>,
    running: AtomicBool,
    next_id: AtomicU64,
}

impl<T: Transport, O: StepObserver> Shared<T, O> {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device(&self) -> DeviceType {
        self.config.device_type
    }

    fn emit_transition(&self, transition: Transition) {
        if transition.changed() {
            self.observer.on_event(&StepEvent::StateChanged {
                from: transition.from,
                to: transition.to,
            });
        }
    }

    fn apply(&self, input: SessionInput) -> Result<Transition> {
        let transition = self.inner().machine.apply(input)?;
        self.emit_transition(transition);
        Ok(transition)
    }

    /// Fail every waiter and drop to Disconnected.
    fn close(&self, reason: CloseReason) {
        self.running.store(false, Ordering::SeqCst);
        let transition = {
            let mut inner = self.inner();
            for (_, pending) in inner.pending.drain() {
                let _ = pending.tx.send(Delivery::Closed(reason.clone()));
            }
            inner.tombstones.clear();
            inner.machine.apply(SessionInput::TransportLost)
        };
        if let Ok(t) = transition {
            self.emit_transition(t);
        }
        info!(reason = ?reason, "Session closed");
    }

    fn route(&self, frame: Frame) {
        self.observer.on_event(&StepEvent::Packet {
            direction: PacketDirection::Rx,
            frame,
            extra: 0,
        });

        let key = frame.key();
        let now = Instant::now();
        let mut inner = self.inner();
        inner.tombstones.retain(|_, expires| *expires > now);

        if inner.tombstones.remove(&key).is_some() {
            drop(inner);
            warn!(frame = ?frame, "Discarding late frame for abandoned request");
            self.observer.on_event(&StepEvent::Log {
                level: LogLevel::Warn,
                message: format!("discarded late response {:02X}/{:02X}", key.0, key.1),
            });
            return;
        }

        let kind = registry::response_kind(key.0, key.1, self.device());
        let target = if inner.pending.contains_key(&key) {
            Some(key)
        } else if kind == Some(MessageKind::DeviceError) {
            inner
                .pending
                .iter()
                .find(|(_, p)| p.device_errors)
                .map(|(k, _)| *k)
        } else {
            None
        };

        let Some(target) = target else {
            drop(inner);
            self.report_unsolicited(frame, kind);
            return;
        };

        let Some(pending) = inner.pending.remove(&target) else {
            return;
        };
        let state = inner.machine.state();
        let delivery = match kind {
            Some(kind) if inner.machine.admits(kind) => Delivery::Frame(frame),
            Some(kind) => {
                warn!(kind = ?kind, state = %state, "Rejecting frame not legal in state");
                Delivery::Rejected(format!("{:?} not allowed while {}", kind, state))
            }
            None => Delivery::Rejected(format!("no response schema for {:?}", frame)),
        };
        drop(inner);

        if let Delivery::Rejected(reason) = &delivery {
            self.observer.on_event(&StepEvent::Log {
                level: LogLevel::Warn,
                message: reason.clone(),
            });
        }
        if kind == Some(MessageKind::DeviceError) {
            self.report_device_error(&frame);
        }
        debug!(key = ?target, "Delivering frame to waiter");
        let _ = pending.tx.send(delivery);
    }

    fn report_unsolicited(&self, frame: Frame, kind: Option<MessageKind>) {
        match kind {
            Some(MessageKind::DeviceError) => self.report_device_error(&frame),
            Some(MessageKind::PrintProgress | MessageKind::BatteryStatus) => {
                debug!(frame = ?frame, "Notification")
            }
            _ => warn!(frame = ?frame, "Dropping frame with no pending request"),
        }
        self.observer.on_event(&StepEvent::Unsolicited { frame });
    }

    fn report_device_error(&self, frame: &Frame) {
        if let Ok(Response::DeviceError { error }) = Response::decode(frame, self.device()) {
            if !error.is_success() {
                self.observer
                    .on_event(&StepEvent::DeviceError { code: error });
            }
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let result = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.transport.write(bytes)
        };
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if !self.transport.is_connected() {
                    self.close(CloseReason::Transport(e.to_string()));
                }
                Err(e.into())
            }
        }
    }
}

fn reader_loop<T: Transport, O: StepObserver>(shared: Arc<Shared<T, O>>) {
    let mut buffer = FrameBuffer::new();
    debug!("Reader started");
    while shared.running.load(Ordering::SeqCst) {
        match shared.transport.read(shared.config.read_size) {
            Ok(bytes) if bytes.is_empty() => continue,
            Ok(bytes) => {
                trace!(len = bytes.len(), "Read");
                match buffer.push(&bytes) {
                    Ok(frames) => {
                        for frame in frames {
                            shared.route(frame);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Framing error, closing session");
                        shared.close(CloseReason::Framing(e));
                        return;
                    }
                }
            }
            Err(TransportError::Timeout { .. }) => continue,
            Err(e) => {
                if shared.running.load(Ordering::SeqCst) {
                    warn!(error = %e, "Transport read failed, closing session");
                    shared.close(CloseReason::Transport(e.to_string()));
                }
                return;
            }
        }
    }
    debug!("Reader stopped");
}

/// Owns the reader thread, the pending-request table and the session state.
pub struct Dispatcher<T: Transport + 'static, O: StepObserver + 'static> {
    shared: Arc<Shared<T, O>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport + 'static, O: StepObserver + 'static> Dispatcher<T, O> {
    pub fn new(transport: Arc<T>, observer: Arc<O>, config: SessionConfig) -> Self {
        let machine = SessionMachine::new(config.operation_timeout(), config.print_timeout());
        Self {
            shared: Arc::new(Shared {
                transport,
                observer,
                config,
                inner: Mutex::new(Inner {
                    machine,
                    pending: HashMap::new(),
                    tombstones: HashMap::new(),
                }),
                write_lock: Mutex::new(()),
                running: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
            }),
            reader: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn observer(&self) -> &O {
        &self.shared.observer
    }

    pub fn transport_alive(&self) -> bool {
        self.shared.transport.is_connected()
    }

    /// Spawn the reader thread.
    pub fn start(&self) -> Result<()> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = reader.take() {
            // Left over from a session closed by the reader itself.
            let _ = handle.join();
        }
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("kstep-reader".into())
            .spawn(move || reader_loop(shared))
            .map_err(TransportError::Io)?;
        *reader = Some(handle);
        Ok(())
    }

    /// Stop the reader, fail all pending requests and drop to Disconnected.
    ///
    /// Blocks until the current transport read returns.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.shared.close(CloseReason::Shutdown);
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner().machine.state()
    }

    pub fn in_update_mode(&self) -> bool {
        self.shared.inner().machine.in_update_mode()
    }

    /// Deadline for a request issued now.
    pub fn operation_timeout(&self) -> Duration {
        self.shared.inner().machine.operation_timeout()
    }

    pub fn require(&self, allowed: &[SessionState], operation: &'static str) -> Result<()> {
        self.shared.inner().machine.require(allowed, operation)
    }

    pub fn apply(&self, input: SessionInput) -> Result<Transition> {
        self.shared.apply(input)
    }

    pub fn emit(&self, event: StepEvent) {
        self.shared.observer.on_event(&event);
    }

    /// Claim the response slot for a pair. Fails without I/O if taken.
    pub fn register(&self, command: Command, sub_command: u8) -> Result<Ticket<T, O>> {
        self.register_inner(command, sub_command, false)
    }

    /// Like [`Dispatcher::register`], but an unsolicited device error
    /// notification also completes the request.
    pub fn register_with_device_errors(
        &self,
        command: Command,
        sub_command: u8,
    ) -> Result<Ticket<T, O>> {
        self.register_inner(command, sub_command, true)
    }

    fn register_inner(
        &self,
        command: Command,
        sub_command: u8,
        device_errors: bool,
    ) -> Result<Ticket<T, O>> {
        let key = (command.code(), sub_command);
        let (tx, rx) = mpsc::channel();
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut inner = self.shared.inner();
            if inner.pending.contains_key(&key) {
                return Err(StepError::RequestAlreadyPending {
                    command,
                    sub_command,
                });
            }
            inner.pending.insert(
                key,
                Pending {
                    id,
                    tx,
                    device_errors,
                },
            );
        }
        Ok(Ticket {
            shared: Arc::clone(&self.shared),
            command,
            sub_command,
            id,
            rx,
        })
    }

    /// Register for the frame's own pair, then write it.
    pub fn request(&self, frame: &Frame) -> Result<Ticket<T, O>> {
        let command = Command::from_code(frame.command()).ok_or_else(|| {
            StepError::InvalidInput(format!("unknown command {:#04X}", frame.command()))
        })?;
        let ticket = self.register(command, frame.sub_command())?;
        self.send_frame(frame)?;
        Ok(ticket)
    }

    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        debug!(frame = ?frame, "Sending frame");
        self.shared.write(frame.as_bytes())?;
        self.emit(StepEvent::Packet {
            direction: PacketDirection::Tx,
            frame: *frame,
            extra: 0,
        });
        Ok(())
    }

    /// Write a header frame and its trailing data in one transport write.
    pub fn send_with_data(&self, header: &Frame, data: &[u8]) -> Result<()> {
        let mut bytes = Vec::with_capacity(header.as_bytes().len() + data.len());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(data);
        debug!(frame = ?header, extra = data.len(), "Sending chunk");
        self.shared.write(&bytes)?;
        self.emit(StepEvent::Packet {
            direction: PacketDirection::Tx,
            frame: *header,
            extra: data.len(),
        });
        Ok(())
    }

    /// Write raw bulk bytes with no frame header.
    pub fn send_raw(&self, data: &[u8]) -> Result<()> {
        debug!(len = data.len(), "Sending raw data");
        self.shared.write(data)
    }
}

impl<T: Transport + 'static, O: StepObserver + 'static> Drop for Dispatcher<T, O> {
    fn drop(&mut self) {
        // The reader holds its own Arc; it exits on its next read.
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

/// A claimed response slot.
///
/// Dropping a ticket that never received its response releases the pair and
/// marks it, so that a response arriving late is discarded instead of being
/// handed to the next request for the same pair.
pub struct Ticket<T: Transport, O: StepObserver> {
    shared: Arc<Shared<T, O>>,
    command: Command,
    sub_command: u8,
    id: u64,
    rx: Receiver<Delivery>,
}

impl<T: Transport, O: StepObserver> Ticket<T, O> {
    pub fn key(&self) -> (u8, u8) {
        (self.command.code(), self.sub_command)
    }

    /// Block for the response. On timeout the session transitions and the
    /// error is returned; the ticket is consumed either way.
    pub fn wait(self, timeout: Duration) -> Result<Response> {
        self.wait_cancellable(timeout, None)
    }

    /// As [`Ticket::wait`], also returning `Cancelled` once `cancel` fires.
    pub fn wait_cancellable(
        self,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<Response> {
        let deadline = Instant::now() + timeout;
        let delivery = loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out(timeout));
            }
            let slice = match cancel {
                Some(_) => (deadline - now).min(CANCEL_POLL),
                None => deadline - now,
            };
            match self.rx.recv_timeout(slice) {
                Ok(delivery) => break delivery,
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_some_and(|c| c.is_cancelled()) {
                        return Err(StepError::Cancelled);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(StepError::SessionClosed("dispatcher dropped".into()));
                }
            }
        };

        match delivery {
            Delivery::Frame(frame) => Ok(Response::decode(&frame, self.shared.device())?),
            Delivery::Rejected(reason) => Err(StepError::ProtocolViolation(reason)),
            Delivery::Closed(reason) => Err(reason.to_error()),
        }
    }

    fn timed_out(&self, after: Duration) -> StepError {
        let transport_alive = self.shared.transport.is_connected();
        warn!(
            command = %self.command,
            sub_command = self.sub_command,
            after_ms = after.as_millis() as u64,
            "Request timed out"
        );
        let _ = self
            .shared
            .apply(SessionInput::OperationTimedOut { transport_alive });
        StepError::Timeout {
            what: format!("{} response (sub {:#04X})", self.command, self.sub_command),
            after,
        }
    }
}

impl<T: Transport, O: StepObserver> Drop for Ticket<T, O> {
    fn drop(&mut self) {
        let key = self.key();
        let mut inner = self.shared.inner();
        if inner.pending.get(&key).is_some_and(|p| p.id == self.id) {
            inner.pending.remove(&key);
            let expires = Instant::now() + self.shared.config.late_frame_window();
            inner.tombstones.insert(key, expires);
            debug!(key = ?key, "Abandoned request, late response will be discarded");
        }
    }
}
