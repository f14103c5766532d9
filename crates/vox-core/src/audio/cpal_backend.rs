//! CPAL device streams for a running session
//!
//! ```text
//! ┌──────────────┐  push()  ┌────────────────┐        ┌──────────────┐
//! │ Input stream │─────────►│  Input ring    │───────►│              │
//! │ (CPAL thread)│ staging  │ (SPSC frames)  │        │  vox-audio   │
//! └──────────────┘          └────────────────┘        │   thread     │
//! ┌──────────────┐  fill()  ┌────────────────┐        │ (effect chain)│
//! │Output stream │◄─────────│  Output ring   │◄───────│              │
//! │ (CPAL thread)│ staging  │ (SPSC frames)  │        └──────────────┘
//! └──────────────┘          └────────────────┘
//! ```
//!
//! The device callbacks never process audio themselves; they only move
//! samples between the device buffers and the session rings, so a slow
//! effect chain shows up as ring underruns instead of device xruns.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::Stream;
use serde::{Deserialize, Serialize};

use super::device::{find_device, stream_config, Direction};
use super::error::{AudioError, AudioResult};
use crate::buffer::{CaptureStaging, PlaybackStaging, VizReader};
use crate::transport::SessionIo;
use crate::types::FrameFormat;

/// Which devices to open; `None` means the system default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSelection {
    pub input: Option<String>,
    pub output: Option<String>,
}

/// Running device streams
///
/// Keeps both streams alive. Drop this to close the devices; the pipeline
/// session itself keeps running until stopped.
pub struct DeviceStreams {
    _input: Stream,
    _output: Stream,
    input_config: cpal::StreamConfig,
    output_config: cpal::StreamConfig,
    /// Post-chain feed for meters and waveform display
    pub visualization: VizReader,
}

impl DeviceStreams {
    pub fn input_channels(&self) -> u16 {
        self.input_config.channels
    }

    pub fn output_channels(&self) -> u16 {
        self.output_config.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.output_config.sample_rate.0
    }
}

/// Open the selected input and output devices and wire them to a session
///
/// Stream errors raise the session's device-fault flag; the pipeline then
/// stops on its next control call.
pub fn start_device_io(io: SessionIo, format: &FrameFormat, devices: &DeviceSelection) -> AudioResult<DeviceStreams> {
    let SessionIo {
        capture,
        playback,
        visualization,
        device_fault,
    } = io;

    let input_device = find_device(Direction::Input, devices.input.as_deref())?;
    let output_device = find_device(Direction::Output, devices.output.as_deref())?;
    log::info!(
        "Audio devices: input '{}', output '{}'",
        input_device.name().unwrap_or_else(|_| "Unknown".to_string()),
        output_device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let input_config = stream_config(
        Direction::Input,
        &input_device,
        format.sample_rate(),
        format.channels(),
        format.block_size(),
    )?;
    let output_config = stream_config(
        Direction::Output,
        &output_device,
        format.sample_rate(),
        format.channels(),
        format.block_size(),
    )?;
    log::info!(
        "Audio config: {}Hz, {} in / {} out channels, buffer {:?}",
        format.sample_rate(),
        input_config.channels,
        output_config.channels,
        output_config.buffer_size
    );

    let mut capture = CaptureStaging::new(capture, format.channels());
    let input_channels = input_config.channels as usize;
    let input_fault = device_fault.clone();
    let input = input_device
        .build_input_stream(
            &input_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| capture.push(data, input_channels),
            move |err| {
                log::error!("Input stream error: {}", err);
                input_fault.signal();
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("Input: {}", e)))?;

    let mut playback = PlaybackStaging::new(playback, format.channels());
    let output_channels = output_config.channels as usize;
    let output = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| playback.fill(data, output_channels),
            move |err| {
                log::error!("Output stream error: {}", err);
                device_fault.signal();
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("Output: {}", e)))?;

    output
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Output: {}", e)))?;
    input
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Input: {}", e)))?;
    log::info!("Audio streams started");

    Ok(DeviceStreams {
        _input: input,
        _output: output,
        input_config,
        output_config,
        visualization,
    })
}
