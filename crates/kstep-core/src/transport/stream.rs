//! Transport over an already-open byte stream.
//!
//! Typical use is a socket or RFCOMM tty that the caller opened and paired.
//! The read half needs a read timeout (`set_read_timeout` on sockets, VTIME
//! on a tty) so the reader thread can observe shutdown.

use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, instrument};

use super::traits::{Transport, TransportError};

pub struct StreamTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    connected: AtomicBool,
    read_timeout_ms: u64,
}

impl<R: Read + Send, W: Write + Send> StreamTransport<R, W> {
    /// `read_timeout_ms` is only reported in timeout errors; the stream itself
    /// enforces it.
    pub fn new(reader: R, writer: W, read_timeout_ms: u64) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            connected: AtomicBool::new(true),
            read_timeout_ms,
        }
    }

    fn mark_lost(&self) -> TransportError {
        self.connected.store(false, Ordering::SeqCst);
        TransportError::Disconnected
    }
}

impl<R: Read + Send, W: Write + Send> Transport for StreamTransport<R, W> {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TransportError::WriteFailed("writer lock poisoned".into()))?;
        let result = writer.write_all(data).and_then(|_| writer.flush());
        match result {
            Ok(()) => {
                debug!(bytes_written = data.len(), "Write complete");
                Ok(data.len())
            }
            Err(e) if is_link_loss(e.kind()) => Err(self.mark_lost()),
            Err(e) => Err(TransportError::WriteFailed(e.to_string())),
        }
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| TransportError::ReadFailed("reader lock poisoned".into()))?;
        let mut buf = vec![0u8; max_len];
        match reader.read(&mut buf) {
            // EOF: the peer closed the link.
            Ok(0) => Err(self.mark_lost()),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Err(TransportError::Timeout {
                    timeout_ms: self.read_timeout_ms,
                })
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(Vec::new()),
            Err(e) if is_link_loss(e.kind()) => Err(self.mark_lost()),
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

fn is_link_loss(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}
