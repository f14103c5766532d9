//! Common types for Vox
//!
//! This module contains the fundamental audio types used throughout the
//! pipeline: the session-wide frame format and the fixed-size sample frame
//! that every ring buffer, effect module and sink works on.

use std::ops::{Index, IndexMut};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default sample rate (matches the capture rate of typical voice input)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default block size in samples per channel (~5.8ms at 44.1kHz)
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Smallest supported block size
pub const MIN_BLOCK_SIZE: usize = 32;

/// Largest supported block size
pub const MAX_BLOCK_SIZE: usize = 4096;

/// Maximum number of interleaved channels per frame
pub const MAX_CHANNELS: usize = 2;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Errors raised when a frame format is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Block size {0} is not a power of two")]
    BlockSizeNotPowerOfTwo(usize),

    #[error("Block size {size} outside supported range {min}..={max}")]
    BlockSizeOutOfRange { size: usize, min: usize, max: usize },

    #[error("Unsupported channel count: {0} (expected 1..={max})", max = MAX_CHANNELS)]
    UnsupportedChannels(usize),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),
}

/// Session-wide frame format
///
/// Fixed for the lifetime of a running session. Changing any field requires
/// stopping the pipeline and starting it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFormat {
    sample_rate: u32,
    block_size: usize,
    channels: usize,
}

impl FrameFormat {
    /// Create a validated frame format
    pub fn new(sample_rate: u32, block_size: usize, channels: usize) -> Result<Self, FormatError> {
        if !(8_000..=192_000).contains(&sample_rate) {
            return Err(FormatError::InvalidSampleRate(sample_rate));
        }
        if !block_size.is_power_of_two() {
            return Err(FormatError::BlockSizeNotPowerOfTwo(block_size));
        }
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
            return Err(FormatError::BlockSizeOutOfRange {
                size: block_size,
                min: MIN_BLOCK_SIZE,
                max: MAX_BLOCK_SIZE,
            });
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(FormatError::UnsupportedChannels(channels));
        }
        Ok(Self { sample_rate, block_size, channels })
    }

    /// Mono format at the given rate and block size
    pub fn mono(sample_rate: u32, block_size: usize) -> Result<Self, FormatError> {
        Self::new(sample_rate, block_size, 1)
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per channel in one frame
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total interleaved samples in one frame
    #[inline]
    pub fn samples_per_frame(&self) -> usize {
        self.block_size * self.channels
    }

    /// Nyquist frequency in Hz
    #[inline]
    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 * 0.5
    }

    /// Duration of one frame (the audio thread's processing deadline)
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }

    /// Convert milliseconds to a sample count at this rate
    #[inline]
    pub fn ms_to_samples(&self, ms: f32) -> usize {
        (ms.max(0.0) * self.sample_rate as f32 / 1000.0) as usize
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            channels: 1,
        }
    }
}

/// A fixed-size block of interleaved samples
///
/// The unit of work for the whole pipeline. A frame is allocated once with
/// the session format and then reused; none of the methods below allocate
/// except the constructors.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    samples: Vec<Sample>,
    channels: usize,
}

impl Frame {
    /// Create a silent frame for the given format
    pub fn silence(format: &FrameFormat) -> Self {
        Self {
            samples: vec![0.0; format.samples_per_frame()],
            channels: format.channels(),
        }
    }

    /// Create a frame from interleaved samples [L, R, L, R, ...]
    pub fn from_interleaved(channels: usize, samples: Vec<Sample>) -> Self {
        assert!(channels > 0, "Frame must have at least one channel");
        assert!(samples.len() % channels == 0, "Interleaved length must be a multiple of channel count");
        Self { samples, channels }
    }

    /// Total number of interleaved samples
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// Fill the frame with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(0.0);
    }

    /// Copy another frame of the same shape into this one (real-time safe)
    pub fn copy_from(&mut self, other: &Frame) {
        debug_assert_eq!(self.samples.len(), other.samples.len(), "copy_from: frame length mismatch");
        self.samples.copy_from_slice(&other.samples);
    }

    /// Copy raw interleaved samples into this frame (real-time safe)
    pub fn copy_from_slice(&mut self, samples: &[Sample]) {
        self.samples.copy_from_slice(samples);
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Hard-clamp every sample to `[-limit, limit]`
    pub fn clamp(&mut self, limit: Sample) {
        for sample in &mut self.samples {
            *sample = sample.clamp(-limit, limit);
        }
    }

    /// Iterate over sample groups, one slice of `channels` samples per instant
    pub fn iter_frames_mut(&mut self) -> std::slice::ChunksExactMut<'_, Sample> {
        self.samples.chunks_exact_mut(self.channels)
    }

    /// Get the peak amplitude in the frame
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.abs()).fold(0.0, Sample::max)
    }

    /// Root-mean-square level across all channels
    pub fn rms(&self) -> Sample {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt() as Sample
    }

    /// True when no sample is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }
}

impl Index<usize> for Frame {
    type Output = Sample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for Frame {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}
