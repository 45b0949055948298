//! Reassembles fixed-size frames from a byte stream.
//!
//! The transport delivers arbitrary slices: half a frame, three frames at
//! once, a frame split across four reads. `FrameBuffer` accumulates the bytes
//! and hands out complete frames. The protocol defines no resynchronization,
//! so a bad magic poisons the buffer and every later push fails too.

use super::constants::{FRAME_LEN, MAGIC};
use super::frame::{Frame, FrameError};

#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
    poisoned: Option<FrameError>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(FRAME_LEN * 4),
            poisoned: None,
        }
    }

    /// Append `data` and extract every complete frame.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>, FrameError> {
        if let Some(err) = &self.poisoned {
            return Err(err.clone());
        }
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while self.buffer.len() - consumed >= FRAME_LEN {
            match Frame::decode(&self.buffer[consumed..]) {
                Ok(frame) => {
                    frames.push(frame);
                    consumed += FRAME_LEN;
                }
                Err(err) => {
                    self.poisoned = Some(err.clone());
                    self.buffer.clear();
                    return Err(err);
                }
            }
        }
        self.buffer.drain(..consumed);

        // A partial header that already disagrees with the magic will never
        // become a valid frame.
        let partial = self.buffer.len().min(MAGIC.len());
        if self.buffer[..partial] != MAGIC[..partial] {
            let mut found = [0u8; 4];
            found[..partial].copy_from_slice(&self.buffer[..partial]);
            let err = FrameError::BadMagic(found);
            self.poisoned = Some(err.clone());
            self.buffer.clear();
            return Err(err);
        }

        Ok(frames)
    }

    /// Bytes waiting for the rest of their frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::DeviceType;

    fn frame(cmd: u8) -> Frame {
        Frame::encode(cmd, 0x00, DeviceType::Standard, &[cmd, 0x01]).unwrap()
    }

    #[test]
    fn test_split_across_reads() {
        let f = frame(0x0B);
        let mut buf = FrameBuffer::new();
        assert!(buf.push(&f.as_bytes()[..10]).unwrap().is_empty());
        assert_eq!(buf.pending(), 10);
        assert!(buf.push(&f.as_bytes()[10..30]).unwrap().is_empty());
        let frames = buf.push(&f.as_bytes()[30..]).unwrap();
        assert_eq!(frames, vec![f]);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut data = Vec::new();
        data.extend_from_slice(frame(0x01).as_bytes());
        data.extend_from_slice(frame(0x0A).as_bytes());
        data.extend_from_slice(&frame(0x0C).as_bytes()[..5]);

        let mut buf = FrameBuffer::new();
        let frames = buf.push(&data).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].command(), 0x0A);
        assert_eq!(buf.pending(), 5);
    }

    #[test]
    fn test_bad_magic_poisons() {
        let mut bytes = *frame(0x01).as_bytes();
        bytes[0] = 0xFF;
        let mut buf = FrameBuffer::new();
        assert!(matches!(buf.push(&bytes), Err(FrameError::BadMagic(_))));
        assert!(buf.is_poisoned());
        assert!(buf.push(frame(0x01).as_bytes()).is_err());
    }

    #[test]
    fn test_partial_bad_magic_detected_early() {
        let mut buf = FrameBuffer::new();
        assert!(buf.push(&[0x1B, 0x2A]).unwrap().is_empty());
        assert!(matches!(
            buf.push(&[0x99]),
            Err(FrameError::BadMagic([0x1B, 0x2A, 0x99, 0x00]))
        ));
    }
}
