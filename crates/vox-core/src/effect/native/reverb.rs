//! Reverb effect
//!
//! A small feedback delay network in the Freeverb layout:
//! - Eight parallel damped comb filters build the decay
//! - Four series all-pass filters diffuse it
//! - Room size drives the comb feedback, which never reaches unity

use crate::effect::{clamp_feedback, Effect, EffectFault, EffectInfo, ParamInfo};
use crate::params::ModuleParams;
use crate::types::{Frame, FrameFormat};

/// Comb filter delay line lengths (in samples at 44.1kHz)
/// These are prime-ish numbers to avoid resonances
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass filter delay line lengths
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];

/// Reference rate the lengths above were tuned for
const REFERENCE_RATE: f32 = 44100.0;

/// Stereo spread offset for the right channel (in samples at 44.1kHz)
const STEREO_SPREAD: usize = 23;

/// Gain compensation for comb filter summing
const COMB_GAIN: f32 = 0.2;

/// Allpass feedback coefficient
const ALLPASS_FEEDBACK: f32 = 0.5;

const SIZE: usize = 0;
const DAMPING: usize = 1;
const WIDTH: usize = 2;
const MIX: usize = 3;

static PARAMS: [ParamInfo; 4] = [
    ParamInfo::new("size", 0.5),
    ParamInfo::new("damping", 0.5),
    ParamInfo::new("width", 1.0),
    ParamInfo::new("mix", 0.3),
];

pub static REVERB_INFO: EffectInfo = EffectInfo {
    name: "Reverb",
    category: "Reverb",
    params: &PARAMS,
};

/// Map room size (0-1) to comb feedback
///
/// 0.7 + size * 0.28 covers small rooms to long halls; the result is clamped
/// into the stable range whatever the input.
#[inline]
pub fn room_feedback(size: f32) -> f32 {
    clamp_feedback(0.7 + size * 0.28)
}

/// Comb filter for reverb
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.pos];

        // One-pole lowpass filter for damping high frequencies
        self.filter_state = output * (1.0 - damp) + self.filter_state * damp;

        self.buffer[self.pos] = input + self.filter_state * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();

        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.pos = 0;
    }
}

/// Allpass filter for diffusion
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = -input + buffered;
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// One channel's comb bank and diffuser
struct Tank {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Tank {
    fn new(scale: f32, spread: usize) -> Self {
        let scaled = |len: usize| ((len + spread) as f32 * scale) as usize;
        Self {
            combs: COMB_LENGTHS.iter().map(|&len| CombFilter::new(scaled(len))).collect(),
            allpasses: ALLPASS_LENGTHS.iter().map(|&len| AllpassFilter::new(scaled(len))).collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input, feedback, damp);
        }
        out *= COMB_GAIN;
        for ap in &mut self.allpasses {
            out = ap.process(out);
        }
        out
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::reset);
        self.allpasses.iter_mut().for_each(AllpassFilter::reset);
    }
}

/// Freeverb-style reverb
///
/// Parameters:
/// - size: Room size, drives decay time (0.0-1.0)
/// - damping: High frequency damping (0.0 = bright, 1.0 = dark)
/// - width: Stereo width for stereo sessions (0.0 = mono, 1.0 = full)
/// - mix: Dry/wet balance
///
/// Mono sessions run only the left tank.
pub struct ReverbEffect {
    left: Tank,
    right: Option<Tank>,
}

impl ReverbEffect {
    pub fn new(format: &FrameFormat) -> Self {
        let scale = format.sample_rate() as f32 / REFERENCE_RATE;
        Self {
            left: Tank::new(scale, 0),
            right: (format.channels() > 1).then(|| Tank::new(scale, STEREO_SPREAD)),
        }
    }
}

impl Effect for ReverbEffect {
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault> {
        let feedback = room_feedback(params.get(SIZE));
        let damp = params.get(DAMPING).clamp(0.0, 1.0);
        let width = params.get(WIDTH).clamp(0.0, 1.0);
        let wet = params.get(MIX).clamp(0.0, 1.0);
        let dry = 1.0 - wet;

        match &mut self.right {
            None => {
                for sample in frame.as_mut_slice() {
                    let out = self.left.process(*sample, feedback, damp);
                    *sample = *sample * dry + out * wet;
                }
            }
            Some(right) => {
                let wet1 = wet * (width / 2.0 + 0.5);
                let wet2 = wet * ((1.0 - width) / 2.0);
                for group in frame.iter_frames_mut() {
                    let input = (group[0] + group[1]) * 0.5;
                    let out_l = self.left.process(input, feedback, damp);
                    let out_r = right.process(input, feedback, damp);
                    group[0] = out_l * wet1 + out_r * wet2 + group[0] * dry;
                    group[1] = out_r * wet1 + out_l * wet2 + group[1] * dry;
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.left.reset();
        if let Some(right) = &mut self.right {
            right.reset();
        }
    }

    fn info(&self) -> &'static EffectInfo {
        &REVERB_INFO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::native::testing::{energy, mono, run, SR};
    use crate::effect::MAX_FEEDBACK;

    #[test]
    fn test_room_feedback_is_bounded() {
        assert!((room_feedback(0.0) - 0.7).abs() < 1e-6);
        assert!(room_feedback(1.0) < 1.0);
        assert_eq!(room_feedback(5.0), MAX_FEEDBACK);
        assert_eq!(room_feedback(-50.0), -MAX_FEEDBACK);
        assert_eq!(room_feedback(f32::NAN), 0.0);
    }

    #[test]
    fn test_reverb_dry() {
        let format = mono(256);
        let mut reverb = ReverbEffect::new(&format);
        let mut input = vec![0.0; 1024];
        input[0] = 1.0;
        let out = run(&mut reverb, &format, &[0.5, 0.5, 1.0, 0.0], &input);
        assert_eq!(out, input);
    }

    #[test]
    fn test_reverb_tail_after_comb_delays() {
        let format = mono(256);
        let mut reverb = ReverbEffect::new(&format);
        let mut input = vec![0.0; 8192];
        input[0] = 1.0;
        let out = run(&mut reverb, &format, &[0.5, 0.5, 1.0, 1.0], &input);

        // Nothing before the shortest comb, a tail after it
        assert!(energy(&out[..1000]) < 1e-6);
        assert!(energy(&out[1500..4000]) > 0.0);
    }

    #[test]
    fn test_impulse_energy_decays_with_oversized_feedback() {
        let format = mono(512);
        let mut reverb = ReverbEffect::new(&format);
        let window = SR as usize / 2;
        let mut input = vec![0.0; window * 8];
        input[0] = 1.0;

        // size 5.0 would mean feedback 2.1 unclamped
        let out = run(&mut reverb, &format, &[5.0, 0.2, 1.0, 1.0], &input);
        let energies: Vec<f64> = out.chunks(window).map(energy).collect();
        for pair in energies.windows(2) {
            assert!(pair[1] < pair[0], "energy grew: {:?}", energies);
        }
    }

    #[test]
    fn test_stereo_spread() {
        let format = FrameFormat::new(SR, 256, 2).unwrap();
        let mut reverb = ReverbEffect::new(&format);
        let params = ModuleParams::from_values(&REVERB_INFO, &[0.5, 0.5, 1.0, 1.0]);
        let mut frame = Frame::silence(&format);
        frame[0] = 1.0;
        frame[1] = 1.0;

        let mut differs = false;
        for _ in 0..16 {
            reverb.process(&mut frame, &params).unwrap();
            differs |= frame.as_slice().chunks_exact(2).any(|g| (g[0] - g[1]).abs() > 1e-4);
            frame.fill_silence();
        }
        assert!(differs);
    }

    #[test]
    fn test_reverb_reset() {
        let format = mono(256);
        let mut reverb = ReverbEffect::new(&format);
        run(&mut reverb, &format, &[0.9, 0.5, 1.0, 1.0], &vec![1.0; 4096]);
        reverb.reset();
        let out = run(&mut reverb, &format, &[0.9, 0.5, 1.0, 1.0], &vec![0.0; 4096]);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
