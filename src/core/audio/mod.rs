//! Audio pipeline primitives.
//!
//! Everything in this module works on raw PCM 16-bit signed little-endian mono
//! audio moved as byte slices:
//!
//! - [`BlockingBuffer`] - growable byte buffer with blocking reads, used to stage
//!   agent (playback) and user (capture) audio
//! - [`FixedFrameReader`] - regroups an arbitrary byte source into whole frames
//! - [`LinearResampler`] with [`ResamplingReader`] / [`ResamplingWriter`] -
//!   sample-rate conversion layered over readers and writers
//! - [`AudioIo`] - the buffer pair owned by a realtime session
//!
//! Reads and writes here are synchronous and may block the calling thread. From
//! async code run them on `tokio::task::spawn_blocking` or a dedicated thread.

pub mod buffer;
pub mod frame;
pub mod io;
pub mod resample;

use std::sync::Arc;

use thiserror::Error;

pub use buffer::{BlockingBuffer, BufferStats};
pub use frame::{FixedFrameReader, frame_size};
pub use io::{AudioIo, CaptureWriter, IoSink, IoSource, PlaybackReader};
pub use resample::{LinearResampler, Resampler, ResamplingReader, ResamplingWriter, resample_pcm};

/// Bytes per PCM16 sample.
pub const BYTES_PER_SAMPLE: usize = 2;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the audio pipeline.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Write or read against a closed buffer
    #[error("Buffer closed")]
    BufferClosed,

    /// Byte count not aligned to the 16-bit sample width
    #[error("Unaligned stream: {0} bytes is not a multiple of the sample width")]
    UnalignedStream(usize),

    /// Caller misuse (undersized buffer, zero sample rate, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Error from an external reader or writer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

// =============================================================================
// Reader / Writer Traits
// =============================================================================

/// A source of raw audio bytes.
///
/// `Ok(0)` signals end-of-stream (for a non-empty `buf`).
///
/// Sources backed by a resettable buffer also report a generation that
/// changes on every reset. Readers that keep bytes of their own between calls
/// must discard them once the generation moves on. Plain sources stay at 0.
pub trait AudioRead: Send {
    fn read(&mut self, buf: &mut [u8]) -> AudioResult<usize>;

    /// Read and return the generation of the bytes handed out.
    fn read_tagged(&mut self, buf: &mut [u8]) -> AudioResult<(usize, u64)> {
        Ok((self.read(buf)?, self.generation()))
    }

    /// Current generation of the source.
    fn generation(&self) -> u64 {
        0
    }
}

/// A sink for raw audio bytes.
pub trait AudioWrite: Send {
    fn write(&mut self, data: &[u8]) -> AudioResult<usize>;
}

impl AudioRead for Arc<BlockingBuffer> {
    fn read(&mut self, buf: &mut [u8]) -> AudioResult<usize> {
        BlockingBuffer::read(self, buf)
    }

    fn read_tagged(&mut self, buf: &mut [u8]) -> AudioResult<(usize, u64)> {
        BlockingBuffer::read_tagged(self, buf)
    }

    fn generation(&self) -> u64 {
        BlockingBuffer::generation(self)
    }
}

impl AudioWrite for Arc<BlockingBuffer> {
    fn write(&mut self, data: &[u8]) -> AudioResult<usize> {
        BlockingBuffer::write(self, data)
    }
}

impl<R: AudioRead + ?Sized> AudioRead for Box<R> {
    fn read(&mut self, buf: &mut [u8]) -> AudioResult<usize> {
        (**self).read(buf)
    }

    fn read_tagged(&mut self, buf: &mut [u8]) -> AudioResult<(usize, u64)> {
        (**self).read_tagged(buf)
    }

    fn generation(&self) -> u64 {
        (**self).generation()
    }
}

impl<W: AudioWrite + ?Sized> AudioWrite for Box<W> {
    fn write(&mut self, data: &[u8]) -> AudioResult<usize> {
        (**self).write(data)
    }
}

// =============================================================================
// PCM Helpers
// =============================================================================

/// Reinterpret little-endian PCM16 bytes as samples.
pub fn bytes_to_samples(data: &[u8]) -> AudioResult<Vec<i16>> {
    if data.len() % BYTES_PER_SAMPLE != 0 {
        return Err(AudioError::UnalignedStream(data.len()));
    }
    Ok(data
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

/// Serialize samples as little-endian PCM16 bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}
