//! kstep-core: KODAK STEP printer protocol engine in Rust.
//!
//! Speaks the printer's Bluetooth serial protocol over any already-connected
//! duplex byte stream: fixed 34-byte frames, a command/sub-command dispatch
//! space, chunked bulk uploads and a print/upgrade session state machine.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Frame codec, reassembly buffer, constants, device error codes
//! - **Registry**: Per-message field schemas and typed responses
//! - **Transport**: Byte stream abstraction (stream adapter, mock)
//! - **State**: Session state machine
//! - **Dispatch**: Reader thread and request/response correlation
//! - **Transfer**: Chunk planning and the step-by-step transfer driver
//! - **Events**: Observer pattern for UI decoupling
//! - **Client**: [`StepPrinter`], the high-level API
//!
//! # Example
//!
//! ```no_run
//! use std::net::TcpStream;
//! use std::time::Duration;
//! use kstep_core::{SessionConfig, StepPrinter, StreamTransport};
//!
//! // Serial-over-TCP bridge to the printer's SPP link. The read timeout lets
//! // the reader thread notice `disconnect`.
//! let link = TcpStream::connect("192.168.4.1:5000")?;
//! link.set_read_timeout(Some(Duration::from_millis(100)))?;
//! let transport = StreamTransport::new(link.try_clone()?, link, 100);
//! let printer = StepPrinter::new(transport, SessionConfig::default());
//!
//! let info = printer.connect()?;
//! println!("battery {}%", info.battery_level);
//!
//! let jpeg = std::fs::read("photo.jpg")?;
//! printer.print_image(&jpeg, 1)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use client::StepPrinter;
pub use config::SessionConfig;
pub use error::{Result, StepError};
pub use events::{LogLevel, NullObserver, PacketDirection, StepEvent, StepObserver, TracingObserver};
pub use protocol::{DeviceErrorCode, DeviceFault, DeviceType, Frame, FrameError, Version};
pub use registry::{AccessoryInfo, Command, ReadyAck, Response, TransferComplete, VersionInfo};
pub use state::SessionState;
pub use transfer::{CancelToken, PrintJob, Transfer, TransferEvent, TransferKind};
pub use transport::{MockTransport, StreamTransport, Transport, TransportError};
