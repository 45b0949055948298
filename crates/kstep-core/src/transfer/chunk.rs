//! Chunk planning for bulk uploads.

use crate::error::{Result, StepError};
use crate::protocol::constants::CHUNK_OVERHEAD;

/// How a payload is split once the printer has announced its max payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total: usize,
    chunk_size: usize,
}

impl ChunkPlan {
    /// Chunks carry at most `max_payload - 20` bytes. A max payload that
    /// leaves no room for data is a protocol violation.
    pub fn new(total: usize, max_payload: u16) -> Result<Self> {
        let max_payload = max_payload as usize;
        if max_payload <= CHUNK_OVERHEAD {
            return Err(StepError::ProtocolViolation(format!(
                "max payload {} leaves no room for chunk data",
                max_payload
            )));
        }
        Ok(Self {
            total,
            chunk_size: max_payload - CHUNK_OVERHEAD,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of chunks, including a trailing partial one.
    pub fn count(&self) -> usize {
        self.total.div_ceil(self.chunk_size)
    }

    pub fn chunks<'a>(&self, data: &'a [u8]) -> ChunkIterator<'a> {
        ChunkIterator::new(data, self.chunk_size)
    }
}

/// Iterator over fixed-size chunks of a payload.
pub struct ChunkIterator<'a> {
    data: &'a [u8],
    chunk_size: usize,
    offset: usize,
    current_chunk: usize,
}

impl<'a> ChunkIterator<'a> {
    pub fn new(data: &'a [u8], chunk_size: usize) -> Self {
        Self {
            data,
            chunk_size,
            offset: 0,
            current_chunk: 0,
        }
    }

    /// Get total number of chunks (including partial).
    pub fn total(&self) -> usize {
        self.data.len().div_ceil(self.chunk_size)
    }

    /// Get current chunk index (0-based).
    pub fn current(&self) -> usize {
        self.current_chunk
    }

    /// Bytes handed out so far.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for ChunkIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        let len = remaining.min(self.chunk_size);
        let chunk = &self.data[self.offset..self.offset + len];
        self.offset += len;
        self.current_chunk += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total() - self.current_chunk;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkIterator<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_sizes() {
        let data = vec![0xAAu8; 1000];
        let plan = ChunkPlan::new(data.len(), 120).unwrap();
        assert_eq!(plan.chunk_size(), 100);
        assert_eq!(plan.count(), 10);

        let chunks: Vec<_> = plan.chunks(&data).collect();
        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c.len() == 100));
    }

    #[test]
    fn test_partial_last_chunk() {
        let data = vec![1u8; 250];
        let plan = ChunkPlan::new(data.len(), 120).unwrap();
        assert_eq!(plan.count(), 3);

        let mut iter = plan.chunks(&data);
        assert_eq!(iter.len(), 3);
        assert_eq!(iter.next().unwrap().len(), 100);
        assert_eq!(iter.next().unwrap().len(), 100);
        assert_eq!(iter.next().unwrap().len(), 50);
        assert_eq!(iter.offset(), 250);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_small_payload_single_chunk() {
        let plan = ChunkPlan::new(7, 512).unwrap();
        assert_eq!(plan.count(), 1);
    }

    #[test]
    fn test_max_payload_too_small() {
        assert!(matches!(
            ChunkPlan::new(10, 20),
            Err(StepError::ProtocolViolation(_))
        ));
        assert!(ChunkPlan::new(10, 21).is_ok());
    }
}
