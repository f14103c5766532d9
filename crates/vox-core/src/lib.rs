//! Vox Core - real-time voice effects pipeline
//!
//! Captured audio flows through fixed-size frames: capture ring → effect
//! chain on a dedicated audio thread → playback ring, with a lossy
//! visualization feed on the side. The control thread edits the chain and
//! parameters through lock-free queues and snapshots; the audio thread never
//! blocks, allocates or frees.

#[cfg(feature = "cpal-backend")]
pub mod audio;
pub mod buffer;
pub mod config;
pub mod effect;
pub mod engine;
pub mod params;
pub mod transport;
pub mod types;

pub use types::*;
