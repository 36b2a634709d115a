//! Fixed-size frame reader.
//!
//! Live capture sources hand out audio in whatever chunk sizes they like. The
//! session packetizes outbound audio per frame, so [`FixedFrameReader`] regroups
//! the upstream bytes into frames of exactly `frame_size` bytes. The only
//! shorter frame is the final one, emitted once when upstream reaches
//! end-of-stream with a partial frame pending.
//!
//! A partial frame never spans an upstream reset: bytes read under an older
//! generation are dropped once newer ones arrive.

use std::time::Duration;

use super::{AudioError, AudioRead, AudioResult};

/// Frame size in bytes for `duration` of audio.
///
/// `round(sample_rate * duration) * bytes_per_sample * channels`
pub fn frame_size(
    sample_rate: u32,
    duration: Duration,
    bytes_per_sample: usize,
    channels: usize,
) -> usize {
    let samples = (sample_rate as f64 * duration.as_secs_f64()).round() as usize;
    samples * bytes_per_sample * channels
}

/// Emits whole frames from an arbitrary byte source.
pub struct FixedFrameReader<R> {
    upstream: R,
    frame_size: usize,
    pending: Vec<u8>,
    /// Upstream generation `pending` was read under
    generation: u64,
    scratch: Vec<u8>,
    eof: bool,
}

impl<R: AudioRead> FixedFrameReader<R> {
    /// Wrap `upstream`, emitting frames of `frame_size` bytes.
    pub fn new(upstream: R, frame_size: usize) -> AudioResult<Self> {
        if frame_size == 0 {
            return Err(AudioError::InvalidArgument(
                "frame size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            upstream,
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
            generation: 0,
            scratch: vec![0u8; frame_size],
            eof: false,
        })
    }

    /// Wrap `upstream` with frames of `duration` at the given PCM layout.
    pub fn with_duration(
        upstream: R,
        sample_rate: u32,
        duration: Duration,
        bytes_per_sample: usize,
        channels: usize,
    ) -> AudioResult<Self> {
        Self::new(
            upstream,
            frame_size(sample_rate, duration, bytes_per_sample, channels),
        )
    }

    /// Configured frame size in bytes.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Get a reference to the upstream source
    pub fn get_ref(&self) -> &R {
        &self.upstream
    }

    fn take(&mut self, buf: &mut [u8], n: usize) -> usize {
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        n
    }

    fn sync_generation(&mut self, generation: u64) {
        if generation != self.generation {
            if !self.pending.is_empty() {
                tracing::trace!(
                    discarded = self.pending.len(),
                    generation,
                    "dropping partial frame from before reset"
                );
            }
            self.pending.clear();
            self.generation = generation;
        }
    }
}

impl<R: AudioRead> AudioRead for FixedFrameReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> AudioResult<usize> {
        self.read_tagged(buf).map(|(n, _)| n)
    }

    fn read_tagged(&mut self, buf: &mut [u8]) -> AudioResult<(usize, u64)> {
        if buf.len() < self.frame_size {
            return Err(AudioError::InvalidArgument(format!(
                "read buffer of {} bytes is smaller than frame size {}",
                buf.len(),
                self.frame_size
            )));
        }

        let current = self.upstream.generation();
        self.sync_generation(current);

        loop {
            if self.pending.len() >= self.frame_size {
                return Ok((self.take(buf, self.frame_size), self.generation));
            }

            if self.eof {
                // Final short frame, then end-of-stream
                let n = self.pending.len();
                return Ok((self.take(buf, n), self.generation));
            }

            let (n, generation) = self.upstream.read_tagged(&mut self.scratch)?;
            self.sync_generation(generation);
            if n == 0 {
                self.eof = true;
            } else {
                self.pending.extend_from_slice(&self.scratch[..n]);
            }
        }
    }

    fn generation(&self) -> u64 {
        self.upstream.generation()
    }
}
