//! Linear-interpolation sample-rate conversion.
//!
//! The resampler is stateless: each call converts the chunk it is given on its
//! own and no fractional position is carried into the next call. Chunk
//! boundaries can therefore produce small audible artifacts. Output length is
//! `floor(len * to / from)`.
//!
//! [`ResamplingReader`] and [`ResamplingWriter`] apply the conversion to data
//! flowing through an [`AudioRead`] / [`AudioWrite`]. They work on whatever
//! chunk sizes they are handed and make no attempt at frame alignment; layer a
//! [`FixedFrameReader`](super::FixedFrameReader) on top for that.

use std::collections::VecDeque;

use super::{
    AudioError, AudioRead, AudioResult, AudioWrite, BYTES_PER_SAMPLE, bytes_to_samples,
    samples_to_bytes,
};

/// Sample-rate conversion strategy.
pub trait Resampler: Send + Sync {
    /// Convert `samples` from `from_rate` to `to_rate`.
    fn resample(&self, samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16>;
}

/// Linear interpolation between neighbouring samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearResampler;

impl Resampler for LinearResampler {
    fn resample(&self, samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
        if from_rate == to_rate {
            return samples.to_vec();
        }
        if from_rate == 0 || to_rate == 0 || samples.is_empty() {
            return Vec::new();
        }

        let ratio = to_rate as f64 / from_rate as f64;
        let out_len = (samples.len() as f64 * ratio).floor() as usize;
        let last = samples.len() - 1;

        (0..out_len)
            .map(|i| {
                let src_pos = i as f64 / ratio;
                let idx = (src_pos.floor() as usize).min(last);
                let next = (idx + 1).min(last);
                let frac = src_pos - src_pos.floor();

                let a = samples[idx] as f64;
                let b = samples[next] as f64;
                (a + (b - a) * frac).round() as i16
            })
            .collect()
    }
}

/// Resample little-endian PCM16 bytes with [`LinearResampler`].
pub fn resample_pcm(data: &[u8], from_rate: u32, to_rate: u32) -> AudioResult<Vec<u8>> {
    let samples = bytes_to_samples(data)?;
    Ok(samples_to_bytes(
        &LinearResampler.resample(&samples, from_rate, to_rate),
    ))
}

fn check_rates(from_rate: u32, to_rate: u32) -> AudioResult<()> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::InvalidArgument(format!(
            "sample rates must be non-zero (from {} to {})",
            from_rate, to_rate
        )));
    }
    Ok(())
}

// =============================================================================
// Resampling Reader
// =============================================================================

/// Reads from `source` at `from_rate` and serves audio at `to_rate`.
pub struct ResamplingReader<R> {
    source: R,
    from_rate: u32,
    to_rate: u32,
    resampler: Box<dyn Resampler>,
    /// Converted bytes that did not fit the caller's buffer
    pending: VecDeque<u8>,
    /// Source generation `pending` was read under
    generation: u64,
    scratch: Vec<u8>,
}

impl<R: AudioRead> ResamplingReader<R> {
    pub fn new(source: R, from_rate: u32, to_rate: u32) -> AudioResult<Self> {
        Self::with_resampler(source, from_rate, to_rate, Box::new(LinearResampler))
    }

    pub fn with_resampler(
        source: R,
        from_rate: u32,
        to_rate: u32,
        resampler: Box<dyn Resampler>,
    ) -> AudioResult<Self> {
        check_rates(from_rate, to_rate)?;
        Ok(Self {
            source,
            from_rate,
            to_rate,
            resampler,
            pending: VecDeque::new(),
            generation: 0,
            scratch: Vec::new(),
        })
    }

    /// Get a reference to the underlying source
    pub fn get_ref(&self) -> &R {
        &self.source
    }

    fn sync_generation(&mut self, generation: u64) {
        if generation != self.generation {
            self.pending.clear();
            self.generation = generation;
        }
    }
}

impl<R: AudioRead> AudioRead for ResamplingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> AudioResult<usize> {
        self.read_tagged(buf).map(|(n, _)| n)
    }

    fn read_tagged(&mut self, buf: &mut [u8]) -> AudioResult<(usize, u64)> {
        let current = self.source.generation();
        self.sync_generation(current);
        if buf.is_empty() {
            return Ok((0, self.generation));
        }

        // A short chunk can resample to nothing; keep pulling until there is
        // output or the source ends.
        while self.pending.is_empty() {
            // Size the upstream read so one chunk roughly fills `buf`
            let want = (buf.len() as u64 * self.from_rate as u64 / self.to_rate as u64) as usize;
            let want = (want - want % BYTES_PER_SAMPLE).max(BYTES_PER_SAMPLE);
            self.scratch.resize(want, 0);

            let (n, generation) = self.source.read_tagged(&mut self.scratch)?;
            self.sync_generation(generation);
            if n == 0 {
                return Ok((0, self.generation));
            }
            if n % BYTES_PER_SAMPLE != 0 {
                return Err(AudioError::UnalignedStream(n));
            }

            let samples = bytes_to_samples(&self.scratch[..n])?;
            let converted = self
                .resampler
                .resample(&samples, self.from_rate, self.to_rate);
            self.pending.extend(samples_to_bytes(&converted));
        }

        let n = buf.len().min(self.pending.len());
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok((n, self.generation))
    }

    fn generation(&self) -> u64 {
        self.source.generation()
    }
}

// =============================================================================
// Resampling Writer
// =============================================================================

/// Accepts audio at `from_rate` and forwards it to `sink` at `to_rate`.
pub struct ResamplingWriter<W> {
    sink: W,
    from_rate: u32,
    to_rate: u32,
    resampler: Box<dyn Resampler>,
}

impl<W: AudioWrite> ResamplingWriter<W> {
    pub fn new(sink: W, from_rate: u32, to_rate: u32) -> AudioResult<Self> {
        Self::with_resampler(sink, from_rate, to_rate, Box::new(LinearResampler))
    }

    pub fn with_resampler(
        sink: W,
        from_rate: u32,
        to_rate: u32,
        resampler: Box<dyn Resampler>,
    ) -> AudioResult<Self> {
        check_rates(from_rate, to_rate)?;
        Ok(Self {
            sink,
            from_rate,
            to_rate,
            resampler,
        })
    }

    /// Get a reference to the underlying sink
    pub fn get_ref(&self) -> &W {
        &self.sink
    }
}

impl<W: AudioWrite> AudioWrite for ResamplingWriter<W> {
    /// Returns the number of input bytes consumed, i.e. `data.len()`.
    fn write(&mut self, data: &[u8]) -> AudioResult<usize> {
        let samples = bytes_to_samples(data)?;
        let converted = self
            .resampler
            .resample(&samples, self.from_rate, self.to_rate);

        let bytes = samples_to_bytes(&converted);
        let mut written = 0;
        while written < bytes.len() {
            let n = self.sink.write(&bytes[written..])?;
            if n == 0 {
                return Err(AudioError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "sink accepted no bytes",
                )));
            }
            written += n;
        }
        Ok(data.len())
    }
}
