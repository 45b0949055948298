//! Step-by-step transfer driver.

use std::iter::FusedIterator;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{CancelToken, ChunkPlan, TransferEvent, TransferKind, TransferSession};
use crate::dispatch::{Dispatcher, Ticket};
use crate::error::{Result, StepError};
use crate::events::{StepEvent, StepObserver};
use crate::protocol::constants::{CHUNK_OVERHEAD, MAX_U24, PRINT_CANCEL};
use crate::protocol::DeviceErrorCode;
use crate::registry::{self, Command, ReadyAck, Response};
use crate::state::{SessionInput, SessionState};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Negotiate,
    Send { offset: usize },
    Await,
    Done,
}

/// A running transfer.
///
/// Each call to `next` performs one step: the ready handshake, one chunk (or
/// the whole image), then the completion wait. The first error ends the
/// sequence and returns the session to Connected. A transfer cannot be
/// restarted; start a new one.
pub struct Transfer<'a, T: Transport + 'static, O: StepObserver + 'static> {
    dispatcher: &'a Dispatcher<T, O>,
    kind: TransferKind,
    data: &'a [u8],
    cancel: CancelToken,
    phase: Phase,
    session: Option<TransferSession>,
    plan: Option<ChunkPlan>,
    completion: Option<Ticket<T, O>>,
}

impl<'a, T: Transport + 'static, O: StepObserver + 'static> Transfer<'a, T, O> {
    /// Validates the payload. No I/O happens until the first `next`.
    pub(crate) fn new(
        dispatcher: &'a Dispatcher<T, O>,
        kind: TransferKind,
        data: &'a [u8],
        cancel: CancelToken,
    ) -> Result<Self> {
        if data.is_empty() {
            return Err(StepError::InvalidInput(format!("empty {} payload", kind)));
        }
        if data.len() > MAX_U24 as usize {
            return Err(StepError::InvalidInput(format!(
                "{} payload of {} bytes exceeds {} bytes",
                kind,
                data.len(),
                MAX_U24
            )));
        }
        Ok(Self {
            dispatcher,
            kind,
            data,
            cancel,
            phase: Phase::Negotiate,
            session: None,
            plan: None,
            completion: None,
        })
    }

    /// Image transfer whose ready exchange already happened in a [`PrintJob`].
    fn accepted_image(
        dispatcher: &'a Dispatcher<T, O>,
        copies: u8,
        data: &'a [u8],
        ack: &ReadyAck,
        completion: Ticket<T, O>,
        cancel: CancelToken,
    ) -> Self {
        let kind = TransferKind::Image { copies };
        Self {
            dispatcher,
            kind,
            data,
            cancel,
            phase: Phase::Send { offset: 0 },
            session: Some(TransferSession::new(
                kind,
                data.len() as u32,
                ack.max_payload,
                dispatcher.config().pacing_delay(),
            )),
            plan: None,
            completion: Some(completion),
        }
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    /// Token that cancels this transfer from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn session(&self) -> Option<&TransferSession> {
        self.session.as_ref()
    }

    /// Drive the transfer to the end, discarding progress.
    pub fn run(self) -> Result<()> {
        for event in self {
            event?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<TransferEvent> {
        if self.cancel.is_cancelled() {
            return Err(StepError::Cancelled);
        }
        match self.phase {
            Phase::Negotiate => self.negotiate(),
            Phase::Send { offset } if self.kind.is_chunked() => self.send_chunk(offset),
            Phase::Send { .. } => self.send_blob(),
            Phase::Await => self.await_completion(),
            Phase::Done => Err(StepError::InvalidState {
                state: self.dispatcher.state(),
                operation: "continue finished transfer",
            }),
        }
    }

    fn negotiate(&mut self) -> Result<TransferEvent> {
        let d = self.dispatcher;
        let total = self.data.len() as u32;
        let ack = negotiate(d, self.kind, total, Some(&self.cancel))?;

        if self.kind.is_chunked() {
            self.plan = Some(ChunkPlan::new(self.data.len(), ack.max_payload)?);
        }

        self.completion = Some(accept(d, self.kind)?);

        info!(
            kind = %self.kind,
            total = total,
            max_payload = ack.max_payload,
            "Transfer accepted"
        );
        self.session = Some(TransferSession::new(
            self.kind,
            total,
            ack.max_payload,
            d.config().pacing_delay(),
        ));
        self.phase = Phase::Send { offset: 0 };
        Ok(self.progress())
    }

    fn send_blob(&mut self) -> Result<TransferEvent> {
        self.dispatcher.send_raw(self.data)?;
        if let Some(session) = self.session.as_mut() {
            session.record(self.data.len());
        }
        self.phase = Phase::Await;
        Ok(self.progress())
    }

    fn send_chunk(&mut self, offset: usize) -> Result<TransferEvent> {
        let d = self.dispatcher;
        let (Some(plan), Some(session)) = (self.plan, self.session.as_mut()) else {
            return Err(StepError::ProtocolViolation(
                "chunk send before negotiation".into(),
            ));
        };

        if offset > 0 {
            thread::sleep(session.pacing_delay);
        }
        let stale = d.config().stale_transfer_timeout();
        if session.idle() > stale {
            warn!(kind = %self.kind, sent = session.sent, "Transfer stalled");
            return Err(StepError::Timeout {
                what: format!("{} transfer progress", self.kind),
                after: stale,
            });
        }
        if self.cancel.is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let end = (offset + plan.chunk_size()).min(self.data.len());
        let chunk = &self.data[offset..end];
        let header = self
            .kind
            .chunk_header(chunk.len() as u16, d.config().device_type)?;
        d.send_with_data(&header, chunk)?;
        session.record(chunk.len());
        debug!(
            kind = %self.kind,
            chunk = offset / plan.chunk_size() + 1,
            of = plan.count(),
            len = chunk.len(),
            "Chunk sent"
        );

        self.phase = if end >= self.data.len() {
            Phase::Await
        } else {
            Phase::Send { offset: end }
        };
        Ok(self.progress())
    }

    fn await_completion(&mut self) -> Result<TransferEvent> {
        let d = self.dispatcher;
        let total = self.data.len() as u32;
        let sent = self.session.as_ref().map_or(0, |s| s.sent);
        if sent != total {
            return Err(StepError::TransferSizeMismatch {
                expected: total,
                actual: sent,
            });
        }

        let ticket = self.completion.take().ok_or_else(|| {
            StepError::ProtocolViolation("completion awaited twice".into())
        })?;
        let response = match ticket.wait_cancellable(d.operation_timeout(), Some(&self.cancel)) {
            // The print was cancelled elsewhere and its report arrived after.
            Err(StepError::ProtocolViolation(_))
                if matches!(self.kind, TransferKind::Image { .. })
                    && d.state() != SessionState::Printing =>
            {
                return Err(StepError::Cancelled);
            }
            other => other?,
        };

        let ended = match (self.kind, response) {
            (TransferKind::Image { .. }, Response::PrintFinished { error }) => {
                check_status(d, error)?;
                Some((SessionState::Printing, SessionInput::PrintEnded))
            }
            (TransferKind::Firmware { .. }, Response::UpgradeStatus { error }) => {
                check_status(d, error)?;
                Some((SessionState::Upgrading, SessionInput::UpgradeEnded))
            }
            (_, Response::DeviceError { error }) => return Err(StepError::Device(error)),
            (_, Response::TransferComplete(done)) => {
                check_status(d, done.error)?;
                if done.transfer_type != self.kind.transfer_type() {
                    return Err(StepError::ProtocolViolation(format!(
                        "completion for transfer type {:#04X}, expected {:#04X}",
                        done.transfer_type,
                        self.kind.transfer_type()
                    )));
                }
                if done.received != total {
                    return Err(StepError::TransferSizeMismatch {
                        expected: total,
                        actual: done.received,
                    });
                }
                None
            }
            (_, other) => {
                return Err(StepError::ProtocolViolation(format!(
                    "unexpected {:?} completing {} transfer",
                    other.kind(),
                    self.kind
                )));
            }
        };

        if let Some((expected, input)) = ended {
            // Someone else already ended the print with cancel_print.
            if d.state() != expected {
                return Err(StepError::Cancelled);
            }
            d.apply(input)?;
        }

        info!(kind = %self.kind, total = total, "Transfer complete");
        self.phase = Phase::Done;
        Ok(TransferEvent::Completed)
    }

    fn progress(&self) -> TransferEvent {
        let (sent, total, percent) = self
            .session
            .as_ref()
            .map_or((0, self.data.len() as u32, 0), |s| (s.sent, s.total, s.percent()));
        self.dispatcher.emit(StepEvent::TransferProgress {
            kind: self.kind,
            sent,
            total,
            percent,
        });
        TransferEvent::Progress(percent)
    }

    /// Tear down after an error or early drop.
    fn abort(&mut self, error: Option<&StepError>) {
        let d = self.dispatcher;
        self.completion = None;
        self.phase = Phase::Done;

        // The printer is still waiting on this job unless it reported otherwise.
        if matches!(error, None | Some(StepError::Cancelled))
            && matches!(self.kind, TransferKind::Image { .. })
            && d.state() == SessionState::Printing
        {
            send_print_cancel(d);
        }

        match error {
            Some(e) => warn!(kind = %self.kind, error = %e, "Transfer aborted"),
            None => warn!(kind = %self.kind, "Transfer dropped before completion"),
        }
        let _ = d.apply(SessionInput::OperationAborted);
    }
}

impl<T: Transport + 'static, O: StepObserver + 'static> Iterator for Transfer<'_, T, O> {
    type Item = Result<TransferEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.phase == Phase::Done {
            return None;
        }
        match self.step() {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                self.abort(Some(&e));
                Some(Err(e))
            }
        }
    }
}

impl<T: Transport + 'static, O: StepObserver + 'static> FusedIterator for Transfer<'_, T, O> {}

impl<T: Transport + 'static, O: StepObserver + 'static> Drop for Transfer<'_, T, O> {
    fn drop(&mut self) {
        if !matches!(self.phase, Phase::Negotiate | Phase::Done) {
            self.abort(None);
        }
    }
}

/// A print job the printer accepted and is holding open for image data.
///
/// Returned by `StepPrinter::request_print`. The session stays in Printing
/// until [`PrintJob::send_image`] hands the bytes to a [`Transfer`], which
/// writes them and waits for the finished report under the print timeout.
/// Dropping the job without sending the image cancels the print.
pub struct PrintJob<'a, T: Transport + 'static, O: StepObserver + 'static> {
    dispatcher: &'a Dispatcher<T, O>,
    copies: u8,
    image_size: u32,
    ack: ReadyAck,
    accepted_at: Instant,
    completion: Option<Ticket<T, O>>,
    cancel: CancelToken,
}

impl<'a, T: Transport + 'static, O: StepObserver + 'static> PrintJob<'a, T, O> {
    pub(crate) fn new(
        dispatcher: &'a Dispatcher<T, O>,
        image_size: u32,
        copies: u8,
    ) -> Result<Self> {
        let kind = TransferKind::Image { copies };
        let cancel = CancelToken::new();
        let ack = negotiate(dispatcher, kind, image_size, Some(&cancel))?;
        let completion = accept(dispatcher, kind)?;
        info!(image_size = image_size, copies = copies, "Print job accepted");
        Ok(Self {
            dispatcher,
            copies,
            image_size,
            ack,
            accepted_at: Instant::now(),
            completion: Some(completion),
            cancel,
        })
    }

    pub fn ready_ack(&self) -> &ReadyAck {
        &self.ack
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Token that cancels the job once its transfer is running.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Hand over the image. It must be exactly the announced size. The
    /// returned transfer writes it on its first step.
    ///
    /// A job left unsent past the print timeout fails with `Timeout`. Any
    /// error here cancels the print.
    pub fn send_image(mut self, data: &'a [u8]) -> Result<Transfer<'a, T, O>> {
        let d = self.dispatcher;
        if data.len() != self.image_size as usize {
            return Err(StepError::TransferSizeMismatch {
                expected: self.image_size,
                actual: u32::try_from(data.len()).unwrap_or(u32::MAX),
            });
        }
        let limit = d.config().print_timeout();
        if self.accepted_at.elapsed() > limit {
            return Err(StepError::Timeout {
                what: "image data for accepted print".into(),
                after: limit,
            });
        }
        if d.state() != SessionState::Printing {
            return Err(StepError::InvalidState {
                state: d.state(),
                operation: "send image for print job",
            });
        }
        let completion = self.completion.take().ok_or_else(|| {
            StepError::ProtocolViolation("print job image sent twice".into())
        })?;
        Ok(Transfer::accepted_image(
            d,
            self.copies,
            data,
            &self.ack,
            completion,
            self.cancel.clone(),
        ))
    }
}

impl<T: Transport + 'static, O: StepObserver + 'static> Drop for PrintJob<'_, T, O> {
    fn drop(&mut self) {
        let Some(completion) = self.completion.take() else {
            return;
        };
        let d = self.dispatcher;
        if d.state() == SessionState::Printing {
            warn!(image_size = self.image_size, "Print job dropped before the image was sent");
            send_print_cancel(d);
            let _ = d.apply(SessionInput::OperationAborted);
        }
        drop(completion);
    }
}

/// Claim the completion slot for `kind` and enter its busy state. Runs before
/// any data goes out so the completion report cannot be missed.
fn accept<T: Transport + 'static, O: StepObserver + 'static>(
    d: &Dispatcher<T, O>,
    kind: TransferKind,
) -> Result<Ticket<T, O>> {
    let (command, sub_command) = kind.completion_key();
    let ticket = match kind {
        TransferKind::Image { .. } | TransferKind::Firmware { .. } => {
            d.register_with_device_errors(command, sub_command)?
        }
        _ => d.register(command, sub_command)?,
    };
    match kind {
        TransferKind::Image { .. } => {
            d.apply(SessionInput::PrintAccepted)?;
        }
        TransferKind::Firmware { .. } => {
            d.apply(SessionInput::UpgradeAccepted)?;
        }
        _ => {}
    }
    Ok(ticket)
}

/// Sized ready exchange shared by every transfer kind.
pub(crate) fn negotiate<T: Transport + 'static, O: StepObserver + 'static>(
    d: &Dispatcher<T, O>,
    kind: TransferKind,
    size: u32,
    cancel: Option<&CancelToken>,
) -> Result<ReadyAck> {
    let frame = kind.ready_request(size, d.config().device_type)?;
    let ticket = d.request(&frame)?;
    let response = ticket.wait_cancellable(d.operation_timeout(), cancel)?;

    let Response::ReadyAck(ack) = response else {
        return Err(StepError::ProtocolViolation(format!(
            "expected ready acknowledgment, got {:?}",
            response.kind()
        )));
    };
    check_status(d, ack.error)?;
    if ack.transfer_type != kind.transfer_type() {
        return Err(StepError::ProtocolViolation(format!(
            "ready acknowledgment for transfer type {:#04X}, expected {:#04X}",
            ack.transfer_type,
            kind.transfer_type()
        )));
    }
    if ack.max_payload as usize <= CHUNK_OVERHEAD {
        return Err(StepError::ProtocolViolation(format!(
            "max payload {} leaves no room for data",
            ack.max_payload
        )));
    }
    Ok(ack)
}

pub(crate) fn check_status<T: Transport + 'static, O: StepObserver + 'static>(
    d: &Dispatcher<T, O>,
    error: DeviceErrorCode,
) -> Result<()> {
    if error.is_success() {
        return Ok(());
    }
    d.emit(StepEvent::DeviceError { code: error });
    Err(StepError::Device(error))
}

/// Fire-and-forget Print/02; the ack arrives as an unsolicited frame.
fn send_print_cancel<T: Transport + 'static, O: StepObserver + 'static>(d: &Dispatcher<T, O>) {
    let frame = match registry::encode_request(
        Command::Print,
        PRINT_CANCEL,
        d.config().device_type,
        &[],
    ) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to build print cancel");
            return;
        }
    };
    if let Err(e) = d.send_frame(&frame) {
        warn!(error = %e, "Failed to send print cancel");
    }
}
