//! Distortion effect - memoryless waveshaping

use crate::effect::{Effect, EffectFault, EffectInfo, ParamInfo};
use crate::params::ModuleParams;
use crate::types::Frame;

const DRIVE: usize = 0;
const TRIM: usize = 1;
const MODE: usize = 2;

static PARAMS: [ParamInfo; 3] = [
    ParamInfo::new("drive", 1.0).with_range(1.0, 20.0).with_unit("×"),
    ParamInfo::new("trim", 1.0).with_range(0.0, 2.0).with_unit("×"),
    // 0 = soft (tanh), 1 = hard clip
    ParamInfo::new("mode", 0.0),
];

pub static DISTORTION_INFO: EffectInfo = EffectInfo {
    name: "Distortion",
    category: "Distortion",
    params: &PARAMS,
};

/// Shaping curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Soft,
    Hard,
}

impl Shape {
    /// Apply the curve to `x` driven by `drive`, normalized so that a
    /// full-scale input stays at full scale
    #[inline]
    fn apply(self, x: f32, drive: f32, norm: f32) -> f32 {
        match self {
            Shape::Soft => (x * drive).tanh() * norm,
            Shape::Hard => (x * drive).clamp(-1.0, 1.0),
        }
    }
}

/// Drive/trim waveshaper
///
/// Parameters:
/// - drive: Pre-shaping gain (1.0 = clean, up to 20.0)
/// - trim: Output level after shaping
/// - mode: 0 = soft clip (tanh), 1 = hard clip
///
/// The shaped signal is blended in over the first unit of drive, so drive
/// 1.0 passes the input through untouched. The soft curve is normalized by
/// `1 / tanh(drive)` so peaks stay near full scale as drive rises.
pub struct DistortionEffect;

impl DistortionEffect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DistortionEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for DistortionEffect {
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault> {
        let drive = params.get(DRIVE).max(1.0);
        let trim = params.get(TRIM).max(0.0);
        let shape = if params.get(MODE) >= 0.5 { Shape::Hard } else { Shape::Soft };
        let blend = (drive - 1.0).min(1.0);

        if blend == 0.0 {
            if trim != 1.0 {
                frame.scale(trim);
            }
            return Ok(());
        }

        let norm = 1.0 / drive.tanh();
        for sample in frame.as_mut_slice() {
            let x = *sample;
            let shaped = shape.apply(x, drive, norm);
            *sample = (x + blend * (shaped - x)) * trim;
        }
        Ok(())
    }

    fn reset(&mut self) {
        // Memoryless
    }

    fn info(&self) -> &'static EffectInfo {
        &DISTORTION_INFO
    }
}
