//! Bounded SPSC frame ring
//!
//! Wraps an `rtrb` sample ring whose capacity is an exact multiple of the
//! frame length. Writes and reads always move whole frames, so a partially
//! written frame is never visible to the consumer.
//!
//! # Real-Time Safety
//!
//! `write`, `read` and `realign` never allocate, lock or block. A write on a
//! full ring fails without touching the ring; a read on an empty ring fails
//! without touching the caller's frame. Both outcomes are counted in
//! [`RingStats`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::types::{Frame, FrameFormat, Sample};

/// Default ring depth in frames (absorbs scheduling jitter)
pub const DEFAULT_RING_DEPTH: usize = 8;

/// Lock-free counters shared by both ends of a ring
///
/// Updated with Relaxed ordering - these are statistics, not synchronization.
#[derive(Debug, Default)]
pub struct RingStats {
    written: AtomicU64,
    read: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
    discarded: AtomicU64,
}

impl RingStats {
    /// Frames successfully written
    #[inline]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Frames successfully read
    #[inline]
    pub fn read(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    /// Writes rejected because the ring was full
    #[inline]
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Reads that found no complete frame
    #[inline]
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Frames dropped by [`FrameReader::realign`]
    #[inline]
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

/// Create a frame ring holding `depth` frames of the given format
///
/// Returns `(FrameWriter, FrameReader)`; each end is owned by exactly one
/// thread.
pub fn frame_ring(format: &FrameFormat, depth: usize) -> (FrameWriter, FrameReader) {
    let frame_len = format.samples_per_frame();
    let depth = depth.max(1);
    let (producer, consumer) = RingBuffer::<Sample>::new(frame_len * depth);
    let stats = Arc::new(RingStats::default());

    (
        FrameWriter {
            producer,
            frame_len,
            depth,
            stats: Arc::clone(&stats),
        },
        FrameReader {
            consumer,
            frame_len,
            depth,
            stats,
        },
    )
}

/// Producer end of a frame ring
pub struct FrameWriter {
    producer: Producer<Sample>,
    frame_len: usize,
    depth: usize,
    stats: Arc<RingStats>,
}

impl FrameWriter {
    /// Write one frame; returns false (and counts an overrun) if the ring is full
    #[inline]
    pub fn write(&mut self, frame: &Frame) -> bool {
        self.write_samples(frame.as_slice())
    }

    /// Write one frame's worth of interleaved samples
    ///
    /// `samples` must be exactly one frame long; anything else is rejected
    /// without touching the ring.
    pub fn write_samples(&mut self, samples: &[Sample]) -> bool {
        if samples.len() != self.frame_len {
            return false;
        }
        let Ok(mut chunk) = self.producer.write_chunk(self.frame_len) else {
            self.stats.overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        first.copy_from_slice(&samples[..split]);
        second.copy_from_slice(&samples[split..]);
        chunk.commit_all();
        self.stats.written.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Frames that can be written right now
    #[inline]
    pub fn free_frames(&self) -> usize {
        self.producer.slots() / self.frame_len
    }

    /// Ring capacity in frames
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Interleaved samples per frame
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// True once the reader has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }

    pub fn stats(&self) -> &Arc<RingStats> {
        &self.stats
    }
}

/// Consumer end of a frame ring
pub struct FrameReader {
    consumer: Consumer<Sample>,
    frame_len: usize,
    depth: usize,
    stats: Arc<RingStats>,
}

impl FrameReader {
    /// Read the oldest frame into `frame`; returns false (and counts an
    /// underrun) if no complete frame is buffered
    #[inline]
    pub fn read(&mut self, frame: &mut Frame) -> bool {
        self.read_samples(frame.as_mut_slice())
    }

    /// Read one frame into an interleaved slice of exactly one frame length
    pub fn read_samples(&mut self, out: &mut [Sample]) -> bool {
        if out.len() != self.frame_len {
            return false;
        }
        let Ok(chunk) = self.consumer.read_chunk(self.frame_len) else {
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        let (first, second) = chunk.as_slices();
        let split = first.len();
        out[..split].copy_from_slice(first);
        out[split..].copy_from_slice(second);
        chunk.commit_all();
        self.stats.read.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Discard every buffered frame so the next read sees only fresh audio
    ///
    /// Returns the number of frames dropped. Used when a paused stream
    /// resumes: anything queued before the pause is stale.
    pub fn realign(&mut self) -> usize {
        self.skip(self.available_frames())
    }

    /// Discard up to `frames` of the oldest buffered frames
    ///
    /// Returns the number actually dropped; they count as discarded.
    pub fn skip(&mut self, frames: usize) -> usize {
        let frames = frames.min(self.available_frames());
        if frames == 0 {
            return 0;
        }
        if let Ok(chunk) = self.consumer.read_chunk(frames * self.frame_len) {
            chunk.commit_all();
        }
        self.stats.discarded.fetch_add(frames as u64, Ordering::Relaxed);
        frames
    }

    /// Count an underrun without attempting a read
    ///
    /// For consumers that poll [`available_frames`](Self::available_frames)
    /// and decide for themselves when a missing frame is late.
    pub fn record_underrun(&self) {
        self.stats.underruns.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames taken off the ring so far, read or discarded
    #[inline]
    pub fn consumed(&self) -> u64 {
        self.stats.read() + self.stats.discarded()
    }

    /// Complete frames waiting to be read
    #[inline]
    pub fn available_frames(&self) -> usize {
        self.consumer.slots() / self.frame_len
    }

    /// Ring capacity in frames
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Interleaved samples per frame
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// True once the writer has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.consumer.is_abandoned()
    }

    pub fn stats(&self) -> &Arc<RingStats> {
        &self.stats
    }
}

/// Playback end of the output ring
///
/// Wraps a [`FrameReader`] and watches a resync mark published by the audio
/// thread: the number of output frames written before the last resume.
/// When the mark moves, every frame up to it that playback has not consumed
/// yet is stale and dropped. Frames processed after the resume are kept, so
/// capture and playback stay aligned.
pub struct PlaybackReader {
    reader: FrameReader,
    resync_mark: Arc<AtomicU64>,
    seen_mark: u64,
}

impl PlaybackReader {
    pub fn new(reader: FrameReader, resync_mark: Arc<AtomicU64>) -> Self {
        let seen_mark = resync_mark.load(Ordering::Acquire);
        Self {
            reader,
            resync_mark,
            seen_mark,
        }
    }

    /// Read the next processed frame
    pub fn read(&mut self, frame: &mut Frame) -> bool {
        self.resync();
        self.reader.read(frame)
    }

    /// Fill `out` (one frame long) with the next processed frame, or with
    /// silence on underrun. Returns whether real audio was delivered.
    pub fn read_or_silence(&mut self, out: &mut [Sample]) -> bool {
        self.resync();
        if self.reader.read_samples(out) {
            true
        } else {
            out.fill(0.0);
            false
        }
    }

    #[inline]
    pub fn available_frames(&self) -> usize {
        self.reader.available_frames()
    }

    #[inline]
    pub fn frame_len(&self) -> usize {
        self.reader.frame_len()
    }

    pub fn stats(&self) -> &Arc<RingStats> {
        self.reader.stats()
    }

    fn resync(&mut self) {
        let mark = self.resync_mark.load(Ordering::Acquire);
        if mark > self.seen_mark {
            self.seen_mark = mark;
            let stale = mark.saturating_sub(self.reader.consumed());
            self.reader.skip(stale as usize);
        }
    }
}
