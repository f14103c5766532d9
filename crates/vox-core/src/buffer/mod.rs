//! Lock-free frame buffers between the device, the audio thread and the UI
//!
//! - [`frame_ring`]: bounded SPSC queue of whole frames (capture → chain,
//!   chain → playback). Overruns and underruns are counted, never silent.
//! - [`visualization_feed`]: lossy post-chain fan-out for meters and
//!   waveform display. Never applies backpressure to the audio thread.
//! - [`CaptureStaging`] / [`PlaybackStaging`]: adapt device callback blocks
//!   to whole frames.

mod ring;
mod staging;
mod viz;

pub use ring::*;
pub use staging::*;
pub use viz::*;
