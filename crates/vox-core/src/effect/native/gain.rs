//! Gain effect - Simple volume control

use crate::effect::{Effect, EffectFault, EffectInfo, ParamInfo};
use crate::params::ModuleParams;
use crate::types::Frame;

const GAIN: usize = 0;

static PARAMS: [ParamInfo; 1] = [ParamInfo::new("gain", 1.0).with_range(0.1, 3.0).with_unit("×")];

pub static GAIN_INFO: EffectInfo = EffectInfo {
    name: "Gain",
    category: "Utility",
    params: &PARAMS,
};

/// A simple gain (volume) effect
///
/// Parameters:
/// - gain: Linear multiplier (0.1-3.0, 1.0 = unity)
///
/// Gain changes are ramped across one frame to avoid zipper noise.
pub struct GainEffect {
    current: f32,
}

impl GainEffect {
    pub fn new() -> Self {
        Self { current: 1.0 }
    }
}

impl Default for GainEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for GainEffect {
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault> {
        let target = params.get(GAIN);
        if self.current.is_nan() {
            self.current = target;
        }
        if target == self.current {
            if target != 1.0 {
                frame.scale(target);
            }
            return Ok(());
        }

        let frames = frame.frames().max(1) as f32;
        let step = (target - self.current) / frames;
        let mut gain = self.current;
        for group in frame.iter_frames_mut() {
            gain += step;
            for sample in group {
                *sample *= gain;
            }
        }
        self.current = target;
        Ok(())
    }

    fn reset(&mut self) {
        // Ramp state only; next frame jumps straight to the target
        self.current = f32::NAN;
    }

    fn info(&self) -> &'static EffectInfo {
        &GAIN_INFO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::native::testing::{mono, run};

    #[test]
    fn test_unity_gain_is_identity() {
        let format = mono(64);
        let mut effect = GainEffect::new();
        let input: Vec<f32> = (0..128).map(|i| (i as f32 * 0.1).sin()).collect();
        let out = run(&mut effect, &format, &[1.0], &input);
        assert_eq!(out, input);
    }

    #[test]
    fn test_gain_ramps_then_holds() {
        let format = mono(64);
        let mut effect = GainEffect::new();
        let input = vec![1.0; 128];
        let out = run(&mut effect, &format, &[2.0], &input);

        // First frame ramps toward 2.0, second frame is steady
        assert!(out[0] > 1.0 && out[0] < 1.1);
        assert!((out[63] - 2.0).abs() < 1e-5);
        assert!(out[64..].iter().all(|&s| (s - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_reset_jumps_to_target() {
        let format = mono(32);
        let mut effect = GainEffect::new();
        effect.reset();
        let out = run(&mut effect, &format, &[0.5], &vec![1.0; 32]);
        assert!(out.iter().all(|&s| s == 0.5));
    }
}
