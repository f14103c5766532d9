//! Native Rust voice effects
//!
//! Every effect here sizes its buffers from the session frame format at
//! construction and is real-time safe in `process`/`reset`.

mod chorus;
mod compressor;
mod distortion;
mod echo;
mod filter;
mod gain;
mod pitch;
mod reverb;
mod robot;

pub use chorus::{ChorusEffect, CHORUS_INFO};
pub use compressor::{CompressorEffect, COMPRESSOR_INFO};
pub use distortion::{DistortionEffect, DISTORTION_INFO};
pub use echo::{EchoEffect, ECHO_INFO};
pub use filter::{BiquadFilterEffect, FilterType, HIGH_PASS_INFO, LOW_PASS_INFO};
pub use gain::{GainEffect, GAIN_INFO};
pub use pitch::{PitchShiftEffect, PITCH_SHIFT_INFO};
pub use reverb::{ReverbEffect, REVERB_INFO};
pub use robot::{RobotEffect, ROBOT_INFO};
