//! Protocol module - wire format definitions.

pub mod constants;
pub mod error_code;
pub mod frame;
pub mod frame_buffer;

pub use error_code::{DeviceErrorCode, DeviceFault};
pub use frame::{DeviceType, Frame, FrameError, Version, decode_size, encode_size};
pub use frame_buffer::FrameBuffer;
