//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::traits::{Transport, TransportError};
use crate::protocol::Frame;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// In-memory printer link.
///
/// Clones share state, so a test can hand one clone to the engine and keep
/// another to script responses and inspect writes.
#[derive(Clone)]
pub struct MockTransport {
    /// Bytes waiting to be returned by `read`.
    inbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Called on every write; whatever it returns is queued for reading.
    responder: Arc<Mutex<Option<Responder>>>,
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(Mutex::new(None)),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue raw bytes to be returned on a later read.
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.inbound.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Queue a whole frame.
    pub fn queue_frame(&self, frame: &Frame) {
        self.queue_bytes(frame.as_bytes());
    }

    /// React to writes, like a device answering requests.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Frames at the start of each captured write (bulk chunks carry data after
    /// their header frame).
    pub fn written_frames(&self) -> Vec<Frame> {
        self.get_writes()
            .iter()
            .filter_map(|w| Frame::decode(w).ok())
            .collect()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    /// Simulate the link dropping.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate the link coming back.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(data.to_vec());

        let replies = match self.responder.lock().unwrap().as_mut() {
            Some(responder) => responder(data),
            None => Vec::new(),
        };
        self.inbound.lock().unwrap().extend(replies);
        Ok(data.len())
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let mut inbound = self.inbound.lock().unwrap();
        match inbound.pop_front() {
            Some(mut bytes) => {
                if bytes.len() > max_len {
                    let rest = bytes.split_off(max_len);
                    inbound.push_front(rest);
                }
                Ok(bytes)
            }
            None => {
                drop(inbound);
                thread::sleep(Duration::from_millis(1));
                Err(TransportError::Timeout { timeout_ms: 1 })
            }
        }
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }
}
