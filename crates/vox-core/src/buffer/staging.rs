//! Device block adapters
//!
//! Audio devices call back with whatever block size and channel layout they
//! negotiated. These adapters sit in the device callback and convert between
//! that and whole pipeline frames: [`CaptureStaging`] accumulates device
//! samples until a frame is complete and writes it to the input ring,
//! [`PlaybackStaging`] pulls processed frames and hands them out one device
//! block at a time.
//!
//! Both are allocation-free after construction.

use super::ring::{FrameWriter, PlaybackReader};
use crate::types::Sample;

/// Map one multichannel sample group onto another layout
///
/// Mono targets get the average of all sources, mono sources are copied to
/// every target channel, otherwise channels map one to one and extra targets
/// are silenced.
#[inline]
pub fn remix(src: &[Sample], dst: &mut [Sample]) {
    match (src.len(), dst.len()) {
        (0, _) => dst.fill(0.0),
        (s, d) if s == d => dst.copy_from_slice(src),
        (s, 1) => dst[0] = src.iter().sum::<Sample>() / s as Sample,
        (1, _) => dst.fill(src[0]),
        (s, _) => {
            let (mapped, rest) = dst.split_at_mut(s.min(dst.len()));
            mapped.copy_from_slice(&src[..mapped.len()]);
            rest.fill(0.0);
        }
    }
}

/// Collects device input into pipeline frames
pub struct CaptureStaging {
    writer: FrameWriter,
    frame: Vec<Sample>,
    channels: usize,
    filled: usize,
}

impl CaptureStaging {
    pub fn new(writer: FrameWriter, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            frame: vec![0.0; writer.frame_len()],
            writer,
            channels,
            filled: 0,
        }
    }

    /// Consume interleaved device samples laid out in `device_channels`
    ///
    /// Completed frames go to the input ring; when it is full the frame is
    /// dropped (and counted as an overrun by the ring).
    pub fn push(&mut self, data: &[Sample], device_channels: usize) {
        if device_channels == 0 {
            return;
        }
        let frames_per_block = self.frame.len() / self.channels;
        for group in data.chunks_exact(device_channels) {
            let start = self.filled * self.channels;
            remix(group, &mut self.frame[start..start + self.channels]);
            self.filled += 1;
            if self.filled == frames_per_block {
                self.writer.write_samples(&self.frame);
                self.filled = 0;
            }
        }
    }
}

/// Hands processed frames to the device one callback block at a time
pub struct PlaybackStaging {
    reader: PlaybackReader,
    frame: Vec<Sample>,
    channels: usize,
    cursor: usize,
}

impl PlaybackStaging {
    pub fn new(reader: PlaybackReader, channels: usize) -> Self {
        let channels = channels.max(1);
        let frame = vec![0.0; reader.frame_len()];
        let cursor = frame.len() / channels;
        Self {
            reader,
            frame,
            channels,
            cursor,
        }
    }

    /// Fill an interleaved device buffer laid out in `device_channels`
    ///
    /// Plays silence for any frame that was not ready in time.
    pub fn fill(&mut self, data: &mut [Sample], device_channels: usize) {
        if device_channels == 0 {
            return;
        }
        let frames_per_block = self.frame.len() / self.channels;
        for group in data.chunks_exact_mut(device_channels) {
            if self.cursor == frames_per_block {
                self.reader.read_or_silence(&mut self.frame);
                self.cursor = 0;
            }
            let start = self.cursor * self.channels;
            remix(&self.frame[start..start + self.channels], group);
            self.cursor += 1;
        }
    }
}
