//! Bulk transfers: images, firmware, stickers, borders and device names.

pub mod chunk;
pub mod driver;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub use chunk::{ChunkIterator, ChunkPlan};
pub use driver::{PrintJob, Transfer};

use crate::protocol::constants::*;
use crate::protocol::{DeviceType, Frame};
use crate::registry::{self, Command, FieldValue, RegistryError};

/// What is being sent. Decides the ready request, the transfer-type byte and
/// how completion is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Sent as one blob; completion is Print/01.
    Image { copies: u8 },
    /// Requires update mode; completion is Upgrade/02.
    Firmware { update_type: u8 },
    Sticker,
    Border,
    DeviceName,
}

impl TransferKind {
    pub fn transfer_type(&self) -> u8 {
        match self {
            TransferKind::Image { .. } => TRANSFER_IMAGE,
            TransferKind::Firmware { .. } => TRANSFER_FIRMWARE,
            TransferKind::Sticker => TRANSFER_STICKER,
            TransferKind::Border => TRANSFER_BORDER,
            TransferKind::DeviceName => TRANSFER_DEVICE_NAME,
        }
    }

    /// Images go out unchunked.
    pub fn is_chunked(&self) -> bool {
        !matches!(self, TransferKind::Image { .. })
    }

    /// Pair the printer answers the ready request on.
    pub fn ready_key(&self) -> (Command, u8) {
        match self {
            TransferKind::Image { .. } => (Command::Print, PRINT_READY),
            TransferKind::Firmware { .. } => (Command::Upgrade, UPGRADE_READY),
            TransferKind::Sticker => (Command::Sticker, STICKER_READY),
            TransferKind::Border => (Command::Border, BORDER_READY),
            TransferKind::DeviceName => (Command::DeviceName, DEVICE_NAME_READY),
        }
    }

    /// Pair the printer reports completion on.
    pub fn completion_key(&self) -> (Command, u8) {
        match self {
            TransferKind::Image { .. } => (Command::Print, PRINT_FINISHED),
            TransferKind::Firmware { .. } => (Command::Upgrade, UPGRADE_STATUS),
            _ => (Command::Upload, UPLOAD_COMPLETE),
        }
    }

    /// Build the sized ready request.
    pub fn ready_request(&self, size: u32, device: DeviceType) -> Result<Frame, RegistryError> {
        let (command, sub_command) = self.ready_key();
        let size = FieldValue::Size(size);
        let values: Vec<(&str, FieldValue)> = match *self {
            TransferKind::Image { copies } => {
                vec![("image_size", size), ("copies", FieldValue::U8(copies))]
            }
            TransferKind::Firmware { update_type } => {
                vec![("image_size", size), ("update_type", FieldValue::U8(update_type))]
            }
            TransferKind::Sticker | TransferKind::Border => vec![("image_size", size)],
            TransferKind::DeviceName => vec![("name_size", size)],
        };
        registry::encode_request(command, sub_command, device, &values)
    }

    /// Upload/00 header announcing one chunk.
    pub fn chunk_header(&self, chunk_len: u16, device: DeviceType) -> Result<Frame, RegistryError> {
        registry::encode_request(
            Command::Upload,
            UPLOAD_CHUNK,
            device,
            &[
                ("chunk_size", FieldValue::U16(chunk_len)),
                ("transfer_type", FieldValue::U8(self.transfer_type())),
            ],
        )
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Image { .. } => write!(f, "image"),
            TransferKind::Firmware { .. } => write!(f, "firmware"),
            TransferKind::Sticker => write!(f, "sticker"),
            TransferKind::Border => write!(f, "border"),
            TransferKind::DeviceName => write!(f, "device name"),
        }
    }
}

/// Item yielded by a [`Transfer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// Share of the payload written so far, 0-100.
    Progress(u8),
    /// The printer confirmed the whole payload.
    Completed,
}

/// Cancels a running transfer from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bookkeeping for one negotiated transfer.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub kind: TransferKind,
    pub total: u32,
    pub max_payload: u16,
    pub sent: u32,
    pub pacing_delay: Duration,
    last_progress: Instant,
}

impl TransferSession {
    pub fn new(kind: TransferKind, total: u32, max_payload: u16, pacing_delay: Duration) -> Self {
        Self {
            kind,
            total,
            max_payload,
            sent: 0,
            pacing_delay,
            last_progress: Instant::now(),
        }
    }

    pub fn record(&mut self, bytes: usize) {
        self.sent = self.sent.saturating_add(bytes as u32);
        self.last_progress = Instant::now();
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.sent as u64 * 100) / self.total as u64).min(100) as u8
    }

    /// Time since bytes last went out.
    pub fn idle(&self) -> Duration {
        self.last_progress.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_types() {
        assert_eq!(TransferKind::Image { copies: 1 }.transfer_type(), 0x00);
        assert_eq!(TransferKind::Firmware { update_type: 0 }.transfer_type(), 0x01);
        assert_eq!(TransferKind::Sticker.transfer_type(), 0x02);
        assert_eq!(TransferKind::Border.transfer_type(), 0x03);
        assert_eq!(TransferKind::DeviceName.transfer_type(), 0x04);
    }

    #[test]
    fn test_print_ready_request() {
        let frame = TransferKind::Image { copies: 2 }
            .ready_request(50_000, DeviceType::Standard)
            .unwrap();
        assert_eq!(frame.key(), (0x00, PRINT_READY));
        assert_eq!(&frame.as_bytes()[8..12], &[0x00, 0xC3, 0x50, 0x02]);
    }

    #[test]
    fn test_chunk_header() {
        let frame = TransferKind::Sticker
            .chunk_header(0x0123, DeviceType::Slim)
            .unwrap();
        assert_eq!(frame.key(), (0x0D, UPLOAD_CHUNK));
        assert_eq!(frame.as_bytes()[5], DEVICE_TYPE_SLIM);
        assert_eq!(&frame.as_bytes()[8..11], &[0x01, 0x23, TRANSFER_STICKER]);
    }

    #[test]
    fn test_completion_keys() {
        assert_eq!(
            TransferKind::Image { copies: 1 }.completion_key(),
            (Command::Print, PRINT_FINISHED)
        );
        assert_eq!(
            TransferKind::Firmware { update_type: 1 }.completion_key(),
            (Command::Upgrade, UPGRADE_STATUS)
        );
        assert_eq!(
            TransferKind::Border.completion_key(),
            (Command::Upload, UPLOAD_COMPLETE)
        );
    }

    #[test]
    fn test_session_percent() {
        let mut session =
            TransferSession::new(TransferKind::Sticker, 400, 120, Duration::from_millis(0));
        assert_eq!(session.percent(), 0);
        session.record(100);
        assert_eq!(session.percent(), 25);
        session.record(300);
        assert_eq!(session.percent(), 100);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }
}
