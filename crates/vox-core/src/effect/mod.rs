//! Effect system - module trait, parameter schemas, and the effect chain
//!
//! Every voice effect implements [`Effect`] and is wrapped in the
//! [`EffectModule`] sum type so the chain can hold a mix of effect kinds
//! without boxing trait objects on the audio thread.
//!
//! Parameters are not stored inside the effects. Each `process` call receives
//! a [`ModuleParams`] view into the current parameter snapshot, indexed by the
//! position of the parameter in the effect's static schema.

pub mod chain;
pub mod module;
pub mod native;
pub mod preset;

pub use chain::*;
pub use module::{EffectKind, EffectModule};

use serde::{Deserialize, Serialize};

use crate::params::ModuleParams;
use crate::types::Frame;

/// Largest feedback magnitude any delay-based effect will apply
///
/// Strictly below 1.0 so every feedback loop decays.
pub const MAX_FEEDBACK: f32 = 0.98;

/// Clamp a requested feedback gain into the stable range
///
/// NaN maps to zero (no feedback).
#[inline]
pub fn clamp_feedback(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-MAX_FEEDBACK, MAX_FEEDBACK)
    }
}

/// Stable identifier of one effect instance in the chain
///
/// Allocated by the chain editor and never reused within a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u32);

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Information about an effect parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamInfo {
    /// Parameter name (stable key for presets and the parameter store)
    pub name: &'static str,
    /// Default value
    pub default: f32,
    /// Minimum accepted value
    pub min: f32,
    /// Maximum accepted value
    pub max: f32,
    /// Unit label (e.g., "ms", "Hz", "dB")
    pub unit: &'static str,
}

impl ParamInfo {
    /// Create a new parameter info with name and default value (range 0-1)
    pub const fn new(name: &'static str, default: f32) -> Self {
        Self {
            name,
            default,
            min: 0.0,
            max: 1.0,
            unit: "",
        }
    }

    /// Set the value range
    pub const fn with_range(self, min: f32, max: f32) -> Self {
        Self { min, max, ..self }
    }

    /// Set the unit label
    pub const fn with_unit(self, unit: &'static str) -> Self {
        Self { unit, ..self }
    }

    /// Clamp a value into range; NaN falls back to the default
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// Check whether a value is inside the accepted range
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Static description of an effect kind
#[derive(Debug)]
pub struct EffectInfo {
    /// Effect name for display
    pub name: &'static str,
    /// Effect category (e.g., "Filter", "Delay", "Pitch")
    pub category: &'static str,
    /// Parameter schema, in index order
    pub params: &'static [ParamInfo],
}

impl EffectInfo {
    /// Get the number of parameters
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Look up a parameter index by name
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Default values for every parameter, in index order
    pub fn defaults(&self) -> Vec<f32> {
        self.params.iter().map(|p| p.default).collect()
    }
}

/// Internal numeric fault reported by an effect
///
/// Returned from [`Effect::process`] instead of panicking. The chain reacts
/// by silencing the frame and resetting only the faulting module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EffectFault {
    #[error("Effect produced non-finite samples")]
    NonFinite,

    #[error("Filter coefficients are unstable")]
    UnstableCoefficients,
}

/// The core effect trait - implemented by all voice effects
///
/// Called only from the audio thread. Implementations must not allocate,
/// lock or block inside `process`/`reset`: every buffer they need is sized
/// at construction from the session [`FrameFormat`](crate::types::FrameFormat).
pub trait Effect: Send {
    /// Process a frame in place using the given parameter values
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault>;

    /// Clear internal state (delay lines, filter history, oscillator phase)
    fn reset(&mut self);

    /// Static description of this effect
    fn info(&self) -> &'static EffectInfo;

    /// Processing latency in samples
    fn latency_samples(&self) -> u32 {
        0
    }
}
