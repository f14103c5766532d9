//! Pipeline session configuration
//!
//! Everything fixed for the lifetime of a session: frame format, ring and
//! queue depths, and the output limiter switch. Changing any of it requires
//! stopping the pipeline and starting it again.

use serde::{Deserialize, Serialize};

use crate::buffer::{DEFAULT_RING_DEPTH, DEFAULT_VIZ_DEPTH};
use crate::engine::{COMMAND_QUEUE_CAPACITY, EVENT_QUEUE_CAPACITY};
use crate::types::{FormatError, FrameFormat, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};

/// Pipeline configuration
///
/// Missing fields in a YAML file take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate in Hz
    /// Default: 44100
    pub sample_rate: u32,

    /// Frames per block (power of two, 32-4096)
    /// Default: 256 (~5.8ms at 44.1kHz)
    pub block_size: usize,

    /// Interleaved channels per frame (1 or 2)
    /// Default: 1
    pub channels: usize,

    /// Depth of the input and output rings in frames
    /// Default: 8
    pub ring_depth: usize,

    /// Depth of the visualization feed in frames
    /// Default: 4
    pub visualization_depth: usize,

    /// Capacity of the control → audio command queue
    pub command_capacity: usize,

    /// Capacity of the audio → control event queue
    pub event_capacity: usize,

    /// Hard-clamp the chain output to [-1, 1]
    /// Default: true
    pub output_limit: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            channels: 1,
            ring_depth: DEFAULT_RING_DEPTH,
            visualization_depth: DEFAULT_VIZ_DEPTH,
            command_capacity: COMMAND_QUEUE_CAPACITY,
            event_capacity: EVENT_QUEUE_CAPACITY,
            output_limit: true,
        }
    }
}

impl PipelineConfig {
    /// Validated frame format for this configuration
    pub fn format(&self) -> Result<FrameFormat, FormatError> {
        FrameFormat::new(self.sample_rate, self.block_size, self.channels)
    }

    /// Check the frame format and clamp queue depths to at least one slot
    pub fn validate(&self) -> Result<Self, FormatError> {
        self.format()?;
        Ok(Self {
            ring_depth: self.ring_depth.max(1),
            visualization_depth: self.visualization_depth.max(1),
            command_capacity: self.command_capacity.max(1),
            event_capacity: self.event_capacity.max(1),
            ..self.clone()
        })
    }

    /// One-way latency through the input and output rings when both are full
    pub fn max_ring_latency(&self) -> std::time::Duration {
        let frames = (2 * self.ring_depth * self.block_size) as f64;
        std::time::Duration::from_secs_f64(frames / self.sample_rate.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_size, 256);
        assert_eq!(config.channels, 1);
        assert_eq!(config.ring_depth, 8);
        assert_eq!(config.visualization_depth, 4);
        assert!(config.output_limit);
        assert_eq!(config.format().unwrap(), FrameFormat::default());
    }

    #[test]
    fn test_validate_rejects_bad_format() {
        let config = PipelineConfig {
            block_size: 300,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(FormatError::BlockSizeNotPowerOfTwo(300)));

        let config = PipelineConfig {
            channels: 3,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(FormatError::UnsupportedChannels(3)));
    }

    #[test]
    fn test_validate_clamps_depths() {
        let config = PipelineConfig {
            ring_depth: 0,
            command_capacity: 0,
            ..Default::default()
        };
        let valid = config.validate().unwrap();
        assert_eq!(valid.ring_depth, 1);
        assert_eq!(valid.command_capacity, 1);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: PipelineConfig = serde_yaml::from_str("block_size: 512\nchannels: 2\n").unwrap();
        assert_eq!(config.block_size, 512);
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_rate, 44100);
        assert!(config.output_limit);
    }

    #[test]
    fn test_ring_latency() {
        let config = PipelineConfig::default();
        let ms = config.max_ring_latency().as_secs_f64() * 1000.0;
        assert!((ms - 92.88).abs() < 0.1, "{ms}");
    }
}
