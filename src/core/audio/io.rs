//! Session audio endpoints.
//!
//! [`AudioIo`] owns the two buffers of a session:
//!
//! - playback: agent audio at the service rate, written by the session as
//!   deltas arrive and read by the application through
//!   resample (service → device) → fixed frames
//! - capture: user audio at the service rate, written by the application
//!   through resample (device → service) and read by the session's send loop
//!   in fixed frames
//!
//! ```text
//!  device mic ──► CaptureWriter ──► [capture buffer] ──► frames ──► transport
//!  transport ──► deltas ──► [playback buffer] ──► PlaybackReader ──► speaker
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::{
    AudioError, AudioRead, AudioResult, AudioWrite, BYTES_PER_SAMPLE, BlockingBuffer,
    FixedFrameReader, ResamplingReader, ResamplingWriter, frame_size,
};

/// How much agent audio the playback buffer is sized for up front.
const PLAYBACK_BUFFER_DURATION: Duration = Duration::from_secs(60);

/// Reader handed to the application for agent audio at the device rate.
pub type PlaybackReader = FixedFrameReader<ResamplingReader<Arc<BlockingBuffer>>>;

/// Writer handed to the application for microphone audio at the device rate.
pub type CaptureWriter = ResamplingWriter<Arc<BlockingBuffer>>;

/// Playback and capture buffers of one session.
#[derive(Debug, Clone)]
pub struct AudioIo {
    playback: Arc<BlockingBuffer>,
    capture: Arc<BlockingBuffer>,
    service_rate: u32,
    device_rate: u32,
    latency: Duration,
}

impl AudioIo {
    /// Create the buffer pair.
    ///
    /// `service_rate` is the remote service's fixed rate, `device_rate` the rate
    /// of the local audio device and `latency` the frame duration used on both
    /// paths.
    pub fn new(service_rate: u32, device_rate: u32, latency: Duration) -> AudioResult<Self> {
        if service_rate == 0 || device_rate == 0 {
            return Err(AudioError::InvalidArgument(
                "sample rates must be non-zero".to_string(),
            ));
        }
        if frame_size(service_rate, latency, BYTES_PER_SAMPLE, 1) == 0
            || frame_size(device_rate, latency, BYTES_PER_SAMPLE, 1) == 0
        {
            return Err(AudioError::InvalidArgument(format!(
                "latency {:?} is too short for a single sample",
                latency
            )));
        }

        let capture_capacity = frame_size(service_rate, latency, BYTES_PER_SAMPLE, 1) * 2;
        let playback_capacity =
            frame_size(service_rate, PLAYBACK_BUFFER_DURATION, BYTES_PER_SAMPLE, 1) * 2;

        Ok(Self {
            playback: Arc::new(BlockingBuffer::new(playback_capacity)),
            capture: Arc::new(BlockingBuffer::new(capture_capacity)),
            service_rate,
            device_rate,
            latency,
        })
    }

    /// Application endpoints: `(reader for playback, writer for capture)`.
    ///
    /// Every call builds fresh decorators over the same shared buffers.
    pub fn endpoints(&self) -> AudioResult<(PlaybackReader, CaptureWriter)> {
        let resampled =
            ResamplingReader::new(self.playback.clone(), self.service_rate, self.device_rate)?;
        let reader = FixedFrameReader::new(resampled, self.device_frame_size())?;
        let writer =
            ResamplingWriter::new(self.capture.clone(), self.device_rate, self.service_rate)?;
        Ok((reader, writer))
    }

    /// Frame reader over the capture buffer at the service rate, used by the
    /// session's send loop.
    pub fn capture_frames(&self) -> AudioResult<FixedFrameReader<Arc<BlockingBuffer>>> {
        FixedFrameReader::new(self.capture.clone(), self.service_frame_size())
    }

    /// Append agent audio (service rate) to the playback buffer.
    pub fn write_playback(&self, data: &[u8]) -> AudioResult<usize> {
        BlockingBuffer::write(&self.playback, data)
    }

    /// Drop all agent audio that has not been played yet.
    ///
    /// Playback readers from [`endpoints`](Self::endpoints) also discard any
    /// partial frame they were assembling.
    pub fn clear_output_buffer(&self) {
        self.playback.reset();
    }

    /// Close both buffers, releasing any blocked readers.
    pub fn close(&self) {
        self.playback.close();
        self.capture.close();
    }

    pub fn playback_buffer(&self) -> &Arc<BlockingBuffer> {
        &self.playback
    }

    pub fn capture_buffer(&self) -> &Arc<BlockingBuffer> {
        &self.capture
    }

    /// Frame size in bytes at the service rate.
    pub fn service_frame_size(&self) -> usize {
        frame_size(self.service_rate, self.latency, BYTES_PER_SAMPLE, 1)
    }

    /// Frame size in bytes at the device rate.
    pub fn device_frame_size(&self) -> usize {
        frame_size(self.device_rate, self.latency, BYTES_PER_SAMPLE, 1)
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    pub fn service_rate(&self) -> u32 {
        self.service_rate
    }
}

// =============================================================================
// std::io adapters
// =============================================================================

/// Adapts a [`std::io::Read`] (capture device, file, stdin) as an audio source.
pub struct IoSource<R>(pub R);

impl<R: std::io::Read + Send> AudioRead for IoSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> AudioResult<usize> {
        loop {
            match self.0.read(buf) {
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                other => return Ok(other?),
            }
        }
    }
}

/// Adapts a [`std::io::Write`] (playback device, file, stdout) as an audio sink.
pub struct IoSink<W>(pub W);

impl<W: std::io::Write + Send> AudioWrite for IoSink<W> {
    fn write(&mut self, data: &[u8]) -> AudioResult<usize> {
        self.0.write_all(data)?;
        self.0.flush()?;
        Ok(data.len())
    }
}
