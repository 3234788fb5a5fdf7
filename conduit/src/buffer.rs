//! FIFO byte queue.
//!
//! [`BufferQueue`] holds bytes as a list of chunks, one per append, plus a
//! read offset into the front chunk. Appends never copy existing data and
//! reads only touch the chunks they consume.

use std::collections::VecDeque;

/// A first-in first-out byte buffer.
#[derive(Debug, Default)]
pub struct BufferQueue {
    chunks: VecDeque<Vec<u8>>,
    /// Bytes of the front chunk already consumed.
    offset: usize,
    len: usize,
}

impl BufferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a copy of `bytes` to the back of the queue.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        self.len += bytes.len();
        self.chunks.push_back(bytes.to_vec());
    }

    /// Number of queued bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns up to `max_len` bytes from the front without consuming them.
    pub fn copy(&self, max_len: usize) -> Vec<u8> {
        let want = max_len.min(self.len);
        let mut out = Vec::with_capacity(want);
        let mut skip = self.offset;

        for chunk in &self.chunks {
            if out.len() == want {
                break;
            }

            let available = &chunk[skip..];
            let take = available.len().min(want - out.len());
            out.extend_from_slice(&available[..take]);
            skip = 0;
        }

        out
    }

    /// Removes and returns up to `max_len` bytes from the front.
    pub fn remove(&mut self, max_len: usize) -> Vec<u8> {
        let want = max_len.min(self.len);
        let mut out = Vec::with_capacity(want);

        while out.len() < want {
            let Some(front) = self.chunks.front() else {
                break;
            };

            let available = &front[self.offset..];
            let take = available.len().min(want - out.len());
            out.extend_from_slice(&available[..take]);

            if take == available.len() {
                self.chunks.pop_front();
                self.offset = 0;
            } else {
                self.offset += take;
            }
        }

        self.len -= out.len();
        out
    }

    /// Borrows the first contiguous run of queued bytes.
    pub(crate) fn front_slice(&self) -> &[u8] {
        self.chunks
            .front()
            .map(|chunk| &chunk[self.offset..])
            .unwrap_or(&[])
    }

    /// Discards `n` bytes from the front.
    pub(crate) fn consume(&mut self, mut n: usize) {
        n = n.min(self.len);
        self.len -= n;

        while n > 0 {
            let Some(front) = self.chunks.front() else {
                break;
            };

            let available = front.len() - self.offset;

            if n >= available {
                n -= available;
                self.chunks.pop_front();
                self.offset = 0;
            } else {
                self.offset += n;
                n = 0;
            }
        }
    }

    /// Drops all queued bytes and releases their storage.
    pub fn clear(&mut self) {
        self.chunks = VecDeque::new();
        self.offset = 0;
        self.len = 0;
    }
}
