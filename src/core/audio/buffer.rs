//! Blocking byte buffer for audio staging.
//!
//! Writers never block: data is appended and the buffer grows past its initial
//! capacity when needed, so audio is never dropped. Readers block on a condition
//! variable until bytes arrive or the buffer is closed.
//!
//! Every `reset` bumps the buffer's generation. [`BlockingBuffer::read_tagged`]
//! returns the generation the bytes were read under, so readers that hold
//! partial data of their own can tell when it predates a reset.
//!
//! Each write wakes a single waiting reader. `reset` and `close` wake all of
//! them: after a reset the readers go back to waiting on an empty buffer, after
//! a close they drain whatever is left and then observe end-of-stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use super::{AudioError, AudioResult};

/// Default initial capacity in bytes
const DEFAULT_BUFFER_CAPACITY: usize = 65536; // 64KB

#[derive(Debug, Default)]
struct BufferState {
    data: VecDeque<u8>,
    closed: bool,
    generation: u64,
}

/// Growable byte FIFO with blocking reads.
#[derive(Debug)]
pub struct BlockingBuffer {
    state: Mutex<BufferState>,
    readable: Condvar,
    /// Advisory sizing, not a hard cap
    capacity: usize,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

impl BlockingBuffer {
    /// Create a buffer with the given initial capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                data: VecDeque::with_capacity(capacity),
                closed: false,
                generation: 0,
            }),
            readable: Condvar::new(),
            capacity,
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
        }
    }

    /// Create with default capacity
    pub fn default_capacity() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }

    /// Append `data` to the buffer.
    ///
    /// Never blocks. Fails with [`AudioError::BufferClosed`] once the buffer has
    /// been closed, otherwise accepts the whole payload.
    pub fn write(&self, data: &[u8]) -> AudioResult<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(AudioError::BufferClosed);
        }

        state.data.extend(data);
        self.bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        drop(state);

        self.readable.notify_one();
        Ok(data.len())
    }

    /// Read up to `buf.len()` bytes, blocking until at least one is available.
    ///
    /// Returns `Ok(0)` once the buffer is closed and drained, or immediately when
    /// `buf` is empty.
    pub fn read(&self, buf: &mut [u8]) -> AudioResult<usize> {
        self.read_tagged(buf).map(|(n, _)| n)
    }

    /// Like [`read`](Self::read), also returning the generation the bytes
    /// belong to.
    pub fn read_tagged(&self, buf: &mut [u8]) -> AudioResult<(usize, u64)> {
        let mut state = self.state.lock();
        if buf.is_empty() {
            return Ok((0, state.generation));
        }

        loop {
            if !state.data.is_empty() {
                let n = buf.len().min(state.data.len());
                for (dst, src) in buf.iter_mut().zip(state.data.drain(..n)) {
                    *dst = src;
                }
                self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                return Ok((n, state.generation));
            }
            if state.closed {
                return Ok((0, state.generation));
            }
            self.readable.wait(&mut state);
        }
    }

    /// Discard all unread bytes without closing the buffer.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let discarded = state.data.len();
        state.data.clear();
        state.generation += 1;
        let generation = state.generation;
        drop(state);

        self.readable.notify_all();
        tracing::trace!(discarded, generation, "audio buffer reset");
    }

    /// Number of resets so far.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Close the buffer. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);

        self.readable.notify_all();
    }

    /// Check if buffer is closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Check if buffer holds no unread bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get statistics
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            reset_count: self.generation(),
            current_len: self.len(),
            capacity: self.capacity,
        }
    }
}

impl Default for BlockingBuffer {
    fn default() -> Self {
        Self::default_capacity()
    }
}

/// Buffer statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub reset_count: u64,
    pub current_len: usize,
    pub capacity: usize,
}
