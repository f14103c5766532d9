//! Device backend error types

use thiserror::Error;

/// Errors raised while opening or running device streams
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No default audio {0} device")]
    NoDefaultDevice(&'static str),

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to query device configurations
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Device cannot run the session format
    #[error("Device '{device}' does not support {sample_rate}Hz f32 audio")]
    UnsupportedFormat { device: String, sample_rate: u32 },

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),
}

/// Result type for device operations
pub type AudioResult<T> = Result<T, AudioError>;
