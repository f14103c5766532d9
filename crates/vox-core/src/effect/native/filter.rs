//! Low-pass and high-pass biquad filters
//!
//! Second-order IIR sections with RBJ cookbook coefficients, run in Direct
//! Form I. The per-channel history holds the last two real input and output
//! samples, so swapping coefficients on a cutoff change keeps the filter
//! memory intact and the output continuous.

use std::f32::consts::PI;

use crate::effect::{Effect, EffectFault, EffectInfo, ParamInfo};
use crate::params::ModuleParams;
use crate::types::{Frame, FrameFormat, MAX_CHANNELS};

const CUTOFF: usize = 0;
const Q: usize = 1;

/// Cutoff never gets closer to Nyquist than this fraction
const MAX_CUTOFF_RATIO: f32 = 0.49;

static LOW_PASS_PARAMS: [ParamInfo; 2] = [
    ParamInfo::new("cutoff", 1000.0).with_range(20.0, 20000.0).with_unit("Hz"),
    ParamInfo::new("q", 0.707).with_range(0.1, 10.0).with_unit("Q"),
];

static HIGH_PASS_PARAMS: [ParamInfo; 2] = [
    ParamInfo::new("cutoff", 300.0).with_range(20.0, 20000.0).with_unit("Hz"),
    ParamInfo::new("q", 0.707).with_range(0.1, 10.0).with_unit("Q"),
];

pub static LOW_PASS_INFO: EffectInfo = EffectInfo {
    name: "Low Pass",
    category: "Filter",
    params: &LOW_PASS_PARAMS,
};

pub static HIGH_PASS_INFO: EffectInfo = EffectInfo {
    name: "High Pass",
    category: "Filter",
    params: &HIGH_PASS_PARAMS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LowPass,
    HighPass,
}

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, Default)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    fn design(filter_type: FilterType, cutoff: f32, q: f32, sample_rate: f32) -> Self {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let a0 = 1.0 + alpha;

        let (b0, b1, b2) = match filter_type {
            FilterType::LowPass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterType::HighPass => {
                let b1 = -(1.0 + cos_w0);
                (-b1 / 2.0, b1, -b1 / 2.0)
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Finite and with both poles strictly inside the unit circle
    fn is_stable(&self) -> bool {
        let finite = [self.b0, self.b1, self.b2, self.a1, self.a2].iter().all(|c| c.is_finite());
        finite && self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }
}

/// Two-sample Direct Form I history for one channel
#[derive(Debug, Clone, Copy, Default)]
struct History {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

/// Biquad low-pass or high-pass filter
///
/// Parameters:
/// - cutoff: Corner frequency in Hz (clamped below Nyquist)
/// - q: Resonance (0.707 = Butterworth)
pub struct BiquadFilterEffect {
    filter_type: FilterType,
    sample_rate: f32,
    max_cutoff: f32,
    coeffs: Coefficients,
    cutoff: f32,
    q: f32,
    history: [History; MAX_CHANNELS],
}

impl BiquadFilterEffect {
    pub fn new(filter_type: FilterType, format: &FrameFormat) -> Self {
        let info = match filter_type {
            FilterType::LowPass => &LOW_PASS_INFO,
            FilterType::HighPass => &HIGH_PASS_INFO,
        };
        let sample_rate = format.sample_rate() as f32;
        let cutoff = info.params[CUTOFF].default;
        let q = info.params[Q].default;
        Self {
            filter_type,
            sample_rate,
            max_cutoff: sample_rate * MAX_CUTOFF_RATIO,
            coeffs: Coefficients::design(filter_type, cutoff, q, sample_rate),
            cutoff,
            q,
            history: [History::default(); MAX_CHANNELS],
        }
    }

    pub fn low_pass(format: &FrameFormat) -> Self {
        Self::new(FilterType::LowPass, format)
    }

    pub fn high_pass(format: &FrameFormat) -> Self {
        Self::new(FilterType::HighPass, format)
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Recompute coefficients if cutoff or Q moved; history is left alone
    fn update(&mut self, cutoff: f32, q: f32) -> Result<(), EffectFault> {
        let cutoff = cutoff.clamp(1.0, self.max_cutoff);
        let q = q.max(0.01);
        if cutoff == self.cutoff && q == self.q {
            return Ok(());
        }
        let coeffs = Coefficients::design(self.filter_type, cutoff, q, self.sample_rate);
        if !coeffs.is_stable() {
            return Err(EffectFault::UnstableCoefficients);
        }
        self.coeffs = coeffs;
        self.cutoff = cutoff;
        self.q = q;
        Ok(())
    }
}

impl Effect for BiquadFilterEffect {
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault> {
        self.update(params.get(CUTOFF), params.get(Q))?;

        let c = self.coeffs;
        let channels = frame.channels().min(MAX_CHANNELS);
        for group in frame.iter_frames_mut() {
            for (sample, h) in group.iter_mut().zip(&mut self.history[..channels]) {
                let x = *sample;
                let y = c.b0 * x + c.b1 * h.x1 + c.b2 * h.x2 - c.a1 * h.y1 - c.a2 * h.y2;
                h.x2 = h.x1;
                h.x1 = x;
                h.y2 = h.y1;
                h.y1 = y;
                *sample = y;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.history = [History::default(); MAX_CHANNELS];
    }

    fn info(&self) -> &'static EffectInfo {
        match self.filter_type {
            FilterType::LowPass => &LOW_PASS_INFO,
            FilterType::HighPass => &HIGH_PASS_INFO,
        }
    }

    fn latency_samples(&self) -> u32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::native::testing::{mono, run, sine, tone_amplitude, SR};

    #[test]
    fn test_low_pass_attenuates_highs() {
        let format = mono(256);
        let mut lp = BiquadFilterEffect::low_pass(&format);
        let input: Vec<f32> = sine(200.0, SR as usize, 0.5)
            .iter()
            .zip(sine(8000.0, SR as usize, 0.5))
            .map(|(a, b)| a + b)
            .collect();
        let out = run(&mut lp, &format, &[1000.0, 0.707], &input);
        let tail = &out[SR as usize / 2..];

        assert!(tone_amplitude(tail, 200.0) > 0.45);
        assert!(tone_amplitude(tail, 8000.0) < 0.02);
    }

    #[test]
    fn test_high_pass_attenuates_lows() {
        let format = mono(256);
        let mut hp = BiquadFilterEffect::high_pass(&format);
        let input: Vec<f32> = sine(60.0, SR as usize, 0.5)
            .iter()
            .zip(sine(3000.0, SR as usize, 0.5))
            .map(|(a, b)| a + b)
            .collect();
        let out = run(&mut hp, &format, &[300.0, 0.707], &input);
        let tail = &out[SR as usize / 2..];

        assert!(tone_amplitude(tail, 3000.0) > 0.45);
        assert!(tone_amplitude(tail, 60.0) < 0.05);
    }

    #[test]
    fn test_cutoff_change_mid_stream_has_no_click() {
        let format = mono(128);
        let mut lp = BiquadFilterEffect::low_pass(&format);
        let input = sine(440.0, SR as usize, 0.5);
        let cutoffs = [1000.0, 1500.0, 2000.0, 2500.0, 2000.0, 1500.0];

        let mut out = Vec::with_capacity(input.len());
        let mut frame = Frame::silence(&format);
        for (i, chunk) in input.chunks_exact(128).enumerate() {
            let values = [cutoffs[i % cutoffs.len()], 0.707];
            let params = ModuleParams::from_values(&LOW_PASS_INFO, &values);
            frame.copy_from_slice(chunk);
            lp.process(&mut frame, &params).unwrap();
            out.extend_from_slice(frame.as_slice());
        }

        // A 440Hz sine at 0.5 moves at most ~0.031 per sample; allow a little
        // transient on top of that but nothing click-sized.
        let max_jump = out.windows(2).map(|w| (w[1] - w[0]).abs()).fold(0.0, f32::max);
        assert!(max_jump < 0.05, "max sample-to-sample jump {max_jump}");
    }

    #[test]
    fn test_silence_at_half_nyquist() {
        let format = mono(256);
        let mut lp = BiquadFilterEffect::low_pass(&format);
        let out = run(&mut lp, &format, &[format.nyquist() / 2.0, 0.707], &vec![0.0; 4096]);
        assert!(out.iter().all(|&s| s.abs() < 1e-9));
    }

    #[test]
    fn test_cutoff_above_nyquist_is_clamped() {
        let format = mono(64);
        let mut lp = BiquadFilterEffect::low_pass(&format);
        let out = run(&mut lp, &format, &[40000.0, 0.707], &sine(440.0, 4096, 0.5));
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_reset_clears_history() {
        let format = mono(64);
        let mut lp = BiquadFilterEffect::low_pass(&format);
        run(&mut lp, &format, &[500.0, 0.707], &vec![1.0; 256]);
        lp.reset();
        let out = run(&mut lp, &format, &[500.0, 0.707], &vec![0.0; 64]);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stereo_channels_are_independent() {
        let format = FrameFormat::new(SR, 64, 2).unwrap();
        let mut lp = BiquadFilterEffect::low_pass(&format);
        let params = ModuleParams::defaults(&LOW_PASS_INFO);
        let mut frame = Frame::silence(&format);
        for group in frame.iter_frames_mut() {
            group[0] = 1.0;
        }
        lp.process(&mut frame, &params).unwrap();
        for group in frame.as_slice().chunks_exact(2) {
            assert_eq!(group[1], 0.0);
        }
    }
}
