//! Visualization feed
//!
//! The audio thread publishes every processed frame here after it has been
//! handed to playback. The UI pulls at its own pace: each pull drains
//! whatever is queued and keeps only the newest frame. When the UI falls
//! behind, the ring fills and further frames are dropped (and counted) on the
//! audio side instead of waiting.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::types::{Frame, FrameFormat, Sample};

/// Default visualization ring depth in frames
pub const DEFAULT_VIZ_DEPTH: usize = 4;

/// Level meters of the most recently published frame
///
/// f32 values stored as raw bits in atomics, Relaxed ordering.
#[derive(Debug, Default)]
pub struct LevelMeters {
    peak: AtomicU32,
    rms: AtomicU32,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl LevelMeters {
    #[inline]
    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn rms(&self) -> f32 {
        f32::from_bits(self.rms.load(Ordering::Relaxed))
    }

    /// Frames offered to the feed
    #[inline]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames dropped because the UI was not keeping up
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// One downsampled waveform bucket
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaveformPoint {
    pub min: Sample,
    pub max: Sample,
}

/// Create a visualization feed holding up to `depth` frames
pub fn visualization_feed(format: &FrameFormat, depth: usize) -> (VizPublisher, VizReader) {
    let frame_len = format.samples_per_frame();
    let (producer, consumer) = RingBuffer::<Sample>::new(frame_len * depth.max(1));
    let meters = Arc::new(LevelMeters::default());

    (
        VizPublisher {
            producer,
            frame_len,
            meters: Arc::clone(&meters),
        },
        VizReader {
            consumer,
            frame_len,
            latest: Frame::silence(format),
            has_frame: false,
            meters,
        },
    )
}

/// Audio-thread end of the feed
pub struct VizPublisher {
    producer: Producer<Sample>,
    frame_len: usize,
    meters: Arc<LevelMeters>,
}

impl VizPublisher {
    /// Offer a frame to the UI (real-time safe, never blocks)
    pub fn publish(&mut self, frame: &Frame) {
        self.meters.peak.store(frame.peak().to_bits(), Ordering::Relaxed);
        self.meters.rms.store(frame.rms().to_bits(), Ordering::Relaxed);
        self.meters.published.fetch_add(1, Ordering::Relaxed);

        let samples = frame.as_slice();
        if samples.len() != self.frame_len {
            return;
        }
        match self.producer.write_chunk(self.frame_len) {
            Ok(mut chunk) => {
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&samples[..split]);
                second.copy_from_slice(&samples[split..]);
                chunk.commit_all();
            }
            Err(_) => {
                self.meters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn meters(&self) -> &Arc<LevelMeters> {
        &self.meters
    }
}

/// UI end of the feed
pub struct VizReader {
    consumer: Consumer<Sample>,
    frame_len: usize,
    latest: Frame,
    has_frame: bool,
    meters: Arc<LevelMeters>,
}

impl VizReader {
    /// Drain pending frames, keeping only the newest
    ///
    /// Returns true if at least one new frame arrived since the last poll.
    pub fn poll(&mut self) -> bool {
        let pending = self.consumer.slots() / self.frame_len;
        if pending == 0 {
            return false;
        }
        // Skip everything but the newest frame without copying it
        if pending > 1 {
            if let Ok(chunk) = self.consumer.read_chunk((pending - 1) * self.frame_len) {
                chunk.commit_all();
            }
        }
        if let Ok(chunk) = self.consumer.read_chunk(self.frame_len) {
            let (first, second) = chunk.as_slices();
            let split = first.len();
            let out = self.latest.as_mut_slice();
            out[..split].copy_from_slice(first);
            out[split..].copy_from_slice(second);
            chunk.commit_all();
            self.has_frame = true;
        }
        true
    }

    /// Pull the most recent frame, or `None` if nothing was ever published
    pub fn latest(&mut self) -> Option<&Frame> {
        self.poll();
        self.has_frame.then_some(&self.latest)
    }

    pub fn meters(&self) -> &Arc<LevelMeters> {
        &self.meters
    }

    /// Downsample the latest frame into at most `points` min/max buckets
    ///
    /// Channels are mixed to mono. Clears `out` first; leaves it empty when
    /// no frame has arrived yet.
    pub fn waveform(&self, points: usize, out: &mut Vec<WaveformPoint>) {
        out.clear();
        if !self.has_frame || points == 0 {
            return;
        }
        let channels = self.latest.channels();
        let frames = self.latest.frames();
        let bucket = frames.div_ceil(points).max(1);
        let samples = self.latest.as_slice();

        let mut start = 0;
        while start < frames {
            let end = (start + bucket).min(frames);
            let mut point = WaveformPoint {
                min: Sample::INFINITY,
                max: Sample::NEG_INFINITY,
            };
            for i in start..end {
                let group = &samples[i * channels..(i + 1) * channels];
                let mono = group.iter().sum::<Sample>() / channels as Sample;
                point.min = point.min.min(mono);
                point.max = point.max.max(mono);
            }
            out.push(point);
            start = end;
        }
    }
}
