//! Transport layer abstraction.
//!
//! The printer speaks over a Bluetooth serial link, but the engine only ever
//! sees an already-connected duplex byte stream. Discovery, pairing and
//! RFCOMM setup happen before a `Transport` exists.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    /// Nothing arrived within the transport's own read timeout. Not fatal.
    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Duplex byte stream to the printer.
///
/// Both methods take `&self`: one thread reads while another writes. The
/// engine serializes writes itself.
pub trait Transport: Send + Sync {
    /// Write all of `data`.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read whatever is available, up to `max_len` bytes. Implementations
    /// should return [`TransportError::Timeout`] rather than block forever so
    /// the reader thread can notice shutdown.
    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Check if the link is still up.
    fn is_connected(&self) -> bool;
}
