//! Audio device lookup and stream configuration
//!
//! Named devices are searched on every available host (ALSA, JACK,
//! PulseAudio, CoreAudio, WASAPI...) so a device can be picked even when it
//! is not on the platform's default host.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Host;

use super::error::{AudioError, AudioResult};

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }

    fn default_device(self, host: &Host) -> Option<cpal::Device> {
        match self {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        }
    }

    fn devices(self, host: &Host) -> Option<Vec<cpal::Device>> {
        let devices = match self {
            Direction::Input => host.input_devices().map(|d| d.collect()),
            Direction::Output => host.output_devices().map(|d| d.collect()),
        };
        devices.ok()
    }

    /// Supported (sample rate range, channel count) pairs
    fn configs(self, device: &cpal::Device) -> Vec<cpal::SupportedStreamConfigRange> {
        let configs = match self {
            Direction::Input => device.supported_input_configs().map(|c| c.collect()),
            Direction::Output => device.supported_output_configs().map(|c| c.collect()),
        };
        configs.unwrap_or_default()
    }
}

/// Resolve a device by name, or the default host's default device
pub fn find_device(direction: Direction, name: Option<&str>) -> AudioResult<cpal::Device> {
    let Some(name) = name else {
        return direction
            .default_device(&cpal::default_host())
            .ok_or(AudioError::NoDefaultDevice(direction.label()));
    };

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        if let Some(device) = direction
            .devices(&host)
            .into_iter()
            .flatten()
            .find(|d| d.name().ok().as_deref() == Some(name))
        {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Pick an f32 stream configuration for `sample_rate`, preferring `channels`
pub(crate) fn stream_config(
    direction: Direction,
    device: &cpal::Device,
    sample_rate: u32,
    channels: usize,
    block_size: usize,
) -> AudioResult<cpal::StreamConfig> {
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let configs = direction.configs(device);
    if configs.is_empty() {
        return Err(AudioError::ConfigError(format!(
            "No supported {} configurations for '{}'",
            direction.label(),
            device_name
        )));
    }

    let usable = |c: &&cpal::SupportedStreamConfigRange| {
        c.sample_format() == cpal::SampleFormat::F32
            && (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&sample_rate)
    };
    let best = configs
        .iter()
        .filter(usable)
        .find(|c| c.channels() as usize == channels)
        .or_else(|| configs.iter().find(usable))
        .ok_or(AudioError::UnsupportedFormat {
            device: device_name,
            sample_rate,
        })?;

    let buffer_size = match best.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&(block_size as u32)) => {
            cpal::BufferSize::Fixed(block_size as u32)
        }
        _ => cpal::BufferSize::Default,
    };

    Ok(cpal::StreamConfig {
        channels: best.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size,
    })
}
