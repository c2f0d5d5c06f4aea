// Input window: chunks waiting for the next dispatch.

use bytes::{Bytes, BytesMut};

/// Ordered pending chunks and their summed length. Chunks are only
/// concatenated when the window is taken for a dispatch.
#[derive(Debug, Default)]
pub struct WindowAccumulator {
    chunks: Vec<Bytes>,
    len: usize,
}

impl WindowAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push(chunk);
        log::trace!("window: {} chunks, {} bytes", self.chunks.len(), self.len);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drain the window into one buffer. A single chunk is handed over
    /// without copying.
    pub fn take(&mut self) -> Bytes {
        let len = std::mem::take(&mut self.len);
        let mut chunks = std::mem::take(&mut self.chunks);
        match chunks.len() {
            0 => Bytes::new(),
            1 => chunks.pop().unwrap_or_default(),
            _ => {
                let mut buf = BytesMut::with_capacity(len);
                for chunk in &chunks {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_the_sum_of_chunks() {
        let mut w = WindowAccumulator::new();
        w.push(Bytes::from_static(b"abc"));
        w.push(Bytes::new());
        w.push(Bytes::from_static(b"de"));
        assert_eq!(w.len(), 5);
        assert_eq!(w.take().as_ref(), b"abcde");
        assert!(w.is_empty());
        assert_eq!(w.take(), Bytes::new());
    }

    #[test]
    fn single_chunk_is_not_copied() {
        let chunk = Bytes::from(vec![1u8; 32]);
        let ptr = chunk.as_ptr();
        let mut w = WindowAccumulator::new();
        w.push(chunk);
        assert_eq!(w.take().as_ptr(), ptr);
    }

    #[test]
    fn clear_discards() {
        let mut w = WindowAccumulator::new();
        w.push(Bytes::from_static(b"xyz"));
        w.clear();
        assert_eq!(w.len(), 0);
        assert!(w.take().is_empty());
    }
}
