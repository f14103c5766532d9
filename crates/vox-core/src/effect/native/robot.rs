//! Robot voice effect - ring modulation with optional bit crushing

use std::f64::consts::TAU;

use crate::effect::{Effect, EffectFault, EffectInfo, ParamInfo};
use crate::params::ModuleParams;
use crate::types::{Frame, FrameFormat};

const CARRIER_HZ: usize = 0;
const DEPTH: usize = 1;
const WAVEFORM: usize = 2;
const BITS: usize = 3;

static PARAMS: [ParamInfo; 4] = [
    ParamInfo::new("carrier_hz", 30.0).with_range(1.0, 2000.0).with_unit("Hz"),
    ParamInfo::new("depth", 1.0),
    // 0 = sine, 1 = square
    ParamInfo::new("waveform", 0.0),
    // 0 disables the crusher
    ParamInfo::new("bits", 0.0).with_range(0.0, 16.0).with_unit("bits"),
];

pub static ROBOT_INFO: EffectInfo = EffectInfo {
    name: "Robot",
    category: "Modulation",
    params: &PARAMS,
};

/// Ring modulator
///
/// Multiplies the voice by a carrier oscillator. At full depth a sine
/// carrier at `f` moves every partial `p` to `p - f` and `p + f`. The
/// oscillator phase runs in f64, wraps at one cycle and carries over from
/// frame to frame. All channels share the carrier.
pub struct RobotEffect {
    sample_rate: f64,
    phase: f64,
}

impl RobotEffect {
    pub fn new(format: &FrameFormat) -> Self {
        Self {
            sample_rate: format.sample_rate() as f64,
            phase: 0.0,
        }
    }

    /// Current oscillator phase in cycles (0.0-1.0)
    pub fn phase(&self) -> f64 {
        self.phase
    }
}

impl Effect for RobotEffect {
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault> {
        let increment = (params.get(CARRIER_HZ).max(0.0) as f64 / self.sample_rate).min(0.5);
        let depth = params.get(DEPTH).clamp(0.0, 1.0);
        let square = params.get(WAVEFORM) >= 0.5;
        let bits = params.get(BITS).round().clamp(0.0, 24.0) as i32;
        let levels = if bits > 0 { 2f32.powi(bits - 1) } else { 0.0 };

        for group in frame.iter_frames_mut() {
            let sine = (self.phase * TAU).sin() as f32;
            let carrier = if square {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            } else {
                sine
            };
            let gain = 1.0 - depth + depth * carrier;

            for sample in group {
                let mut y = *sample * gain;
                if levels > 0.0 {
                    y = (y * levels).round() / levels;
                }
                *sample = y;
            }

            self.phase += increment;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn info(&self) -> &'static EffectInfo {
        &ROBOT_INFO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::native::testing::{mono, run, sine, tone_amplitude, SR};

    #[test]
    fn test_ring_mod_sidebands() {
        let format = mono(256);
        let mut robot = RobotEffect::new(&format);
        let input = sine(1000.0, SR as usize, 1.0);
        let out = run(&mut robot, &format, &[30.0, 1.0, 0.0, 0.0], &input);

        let lower = tone_amplitude(&out, 970.0);
        let upper = tone_amplitude(&out, 1030.0);
        let center = tone_amplitude(&out, 1000.0);
        assert!(lower > 0.45, "970Hz amplitude {lower}");
        assert!(upper > 0.45, "1030Hz amplitude {upper}");
        assert!(center < 0.01, "1000Hz amplitude {center}");
    }

    #[test]
    fn test_phase_continuous_across_frames() {
        // Processing in small and large frames must give the same signal
        let input = vec![1.0; 4096];
        let small = mono(32);
        let large = mono(1024);
        let mut a = RobotEffect::new(&small);
        let mut b = RobotEffect::new(&large);
        let params = [440.0, 1.0, 0.0, 0.0];

        let out_a = run(&mut a, &small, &params, &input);
        let out_b = run(&mut b, &large, &params, &input);
        assert_eq!(out_a, out_b);

        // And no jump at frame edges beyond what the carrier slope allows
        let max_step = (TAU * 440.0 / SR as f64) as f32 * 1.01;
        assert!(out_a.windows(2).all(|w| (w[1] - w[0]).abs() <= max_step));
    }

    #[test]
    fn test_phase_wraps() {
        let format = mono(256);
        let mut robot = RobotEffect::new(&format);
        run(&mut robot, &format, &[1000.0, 1.0, 0.0, 0.0], &vec![0.0; 44100]);
        assert!(robot.phase() >= 0.0 && robot.phase() < 1.0);
    }

    #[test]
    fn test_zero_depth_is_identity() {
        let format = mono(64);
        let mut robot = RobotEffect::new(&format);
        let input = sine(300.0, 512, 0.8);
        let out = run(&mut robot, &format, &[30.0, 0.0, 1.0, 0.0], &input);
        assert_eq!(out, input);
    }

    #[test]
    fn test_bit_crush_quantizes() {
        let format = mono(64);
        let mut robot = RobotEffect::new(&format);
        let input = sine(300.0, 512, 0.8);
        let out = run(&mut robot, &format, &[30.0, 0.0, 0.0, 3.0], &input);
        // 3 bits: multiples of 1/4
        assert!(out.iter().all(|&s| ((s * 4.0) - (s * 4.0).round()).abs() < 1e-6));
    }

    #[test]
    fn test_square_carrier_flips_sign() {
        let format = mono(64);
        let mut robot = RobotEffect::new(&format);
        let out = run(&mut robot, &format, &[SR as f32 / 64.0, 1.0, 1.0, 0.0], &vec![0.5; 64]);
        assert!(out[..32].iter().all(|&s| s == 0.5));
        assert!(out[32..].iter().all(|&s| s == -0.5));
    }
}
