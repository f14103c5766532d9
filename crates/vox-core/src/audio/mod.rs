//! Device backend (feature `cpal-backend`)
//!
//! Connects the default (or named) capture and playback devices to the
//! endpoints of a running session:
//!
//! ```ignore
//! use vox_core::audio::{start_device_io, DeviceSelection};
//! use vox_core::transport::Pipeline;
//!
//! let mut pipeline = Pipeline::new(config)?;
//! let io = pipeline.start()?;
//! let streams = start_device_io(io, pipeline.format(), &DeviceSelection::default())?;
//!
//! // Control thread: poll status and meters
//! for event in pipeline.poll_events() { /* ... */ }
//! let peak = streams.visualization.meters().peak();
//! ```
//!
//! Device callbacks only stage samples into and out of the session rings;
//! the effect chain runs on the pipeline's own audio thread.

mod cpal_backend;
mod device;
mod error;

pub use cpal_backend::{start_device_io, DeviceSelection, DeviceStreams};
pub use device::{find_device, Direction};
pub use error::{AudioError, AudioResult};
