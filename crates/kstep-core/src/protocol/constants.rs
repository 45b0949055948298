//! Protocol constants for the KODAK STEP serial protocol.
//!
//! Offsets are absolute positions inside a 34-byte frame.

use std::time::Duration;

// ============================================================================
// Frame Layout
// ============================================================================

/// Fixed frame header `ESC * C A`.
pub const MAGIC: [u8; 4] = [0x1B, 0x2A, 0x43, 0x41];

/// Every frame on the wire is exactly this long.
pub const FRAME_LEN: usize = 34;

/// Reserved byte, always zero on encode.
pub const RESERVED_OFFSET: usize = 4;
pub const DEVICE_TYPE_OFFSET: usize = 5;
pub const COMMAND_OFFSET: usize = 6;
pub const SUB_COMMAND_OFFSET: usize = 7;

/// Start of the payload region.
pub const PAYLOAD_OFFSET: usize = 8;
/// Payload region length (zero padded).
pub const PAYLOAD_LEN: usize = FRAME_LEN - PAYLOAD_OFFSET;

/// Largest value a 24-bit size field can carry.
pub const MAX_U24: u32 = 0x00FF_FFFF;

// ============================================================================
// Device Types
// ============================================================================

pub const DEVICE_TYPE_STANDARD: u8 = 0x00;
pub const DEVICE_TYPE_SLIM: u8 = 0x02;

// ============================================================================
// Sub-commands
// ============================================================================

/// Print (0x00)
pub const PRINT_READY: u8 = 0x00;
pub const PRINT_FINISHED: u8 = 0x01;
pub const PRINT_CANCEL: u8 = 0x02;

/// Accessory (0x01)
pub const ACCESSORY_INFO: u8 = 0x00;

/// Firmware (0x02)
pub const FIRMWARE_VERSION: u8 = 0x04;
pub const FIRMWARE_MINOR_VERSION: u8 = 0x05;

/// Upgrade (0x03)
pub const UPGRADE_ENTER_UPDATE_MODE: u8 = 0x00;
pub const UPGRADE_READY: u8 = 0x01;
pub const UPGRADE_STATUS: u8 = 0x02;

/// Unsolicited notifications (Error 0x04, Progress 0x05, Battery 0x06)
pub const NOTIFY: u8 = 0x00;

/// Device name (0x07)
pub const DEVICE_NAME_READY: u8 = 0x00;
pub const DEVICE_NAME_GET: u8 = 0x01;

/// Sticker (0x08) / Border (0x09)
pub const STICKER_READY: u8 = 0x00;
pub const BORDER_READY: u8 = 0x00;

/// Simple getters (PaperType 0x0A, BatteryLevel 0x0B, AutoPowerOff 0x0C)
pub const GET: u8 = 0x00;
pub const AUTO_POWER_OFF_SET: u8 = 0x01;

/// Upload (0x0D)
pub const UPLOAD_CHUNK: u8 = 0x00;
pub const UPLOAD_COMPLETE: u8 = 0x01;

// ============================================================================
// Transfer Types (carried in ready acknowledgments and chunk headers)
// ============================================================================

pub const TRANSFER_IMAGE: u8 = 0x00;
pub const TRANSFER_FIRMWARE: u8 = 0x01;
pub const TRANSFER_STICKER: u8 = 0x02;
pub const TRANSFER_BORDER: u8 = 0x03;
pub const TRANSFER_DEVICE_NAME: u8 = 0x04;

/// Bytes of each negotiated payload reserved for bulk framing overhead.
pub const CHUNK_OVERHEAD: usize = 20;

// ============================================================================
// Timing
// ============================================================================

/// Generic operation timeout.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Operation timeout while a print is in progress.
pub const PRINT_TIMEOUT: Duration = Duration::from_secs(9);

/// Abort a chunked transfer after this long without progress.
pub const STALE_TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between consecutive bulk chunks.
pub const PACING_DELAY: Duration = Duration::from_millis(100);

/// How long a cancelled request keeps claiming its late response.
pub const LATE_FRAME_WINDOW: Duration = Duration::from_secs(1);

/// Default size of a single transport read.
pub const READ_CHUNK: usize = 512;
