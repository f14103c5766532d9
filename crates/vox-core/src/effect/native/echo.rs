//! Echo effect
//!
//! A multi-tap delay with:
//! - Delay time in ms
//! - Up to three taps at 1x, 2x and 3x the delay time
//! - Feedback from the first tap (always kept strictly below unity)
//! - Dry/wet mix

use crate::effect::{clamp_feedback, Effect, EffectFault, EffectInfo, ParamInfo};
use crate::params::ModuleParams;
use crate::types::{Frame, FrameFormat, MAX_CHANNELS};

/// Maximum delay time of a single tap
const MAX_DELAY_MS: f32 = 1000.0;

/// Maximum number of taps
const MAX_TAPS: usize = 3;

/// Relative level of each tap
const TAP_GAINS: [f32; MAX_TAPS] = [1.0, 0.6, 0.3];

const DELAY_MS: usize = 0;
const FEEDBACK: usize = 1;
const TAPS: usize = 2;
const MIX: usize = 3;

static PARAMS: [ParamInfo; 4] = [
    ParamInfo::new("delay_ms", 180.0).with_range(10.0, MAX_DELAY_MS).with_unit("ms"),
    ParamInfo::new("feedback", 0.5).with_range(0.0, 0.95),
    ParamInfo::new("taps", 1.0).with_range(1.0, MAX_TAPS as f32),
    ParamInfo::new("mix", 0.5).with_range(0.0, 1.0),
];

pub static ECHO_INFO: EffectInfo = EffectInfo {
    name: "Echo",
    category: "Delay",
    params: &PARAMS,
};

/// Circular delay line long enough for the furthest tap
struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            write_pos: 0,
        }
    }

    /// Sample written `delay` samples ago (delay >= 1)
    #[inline]
    fn tap(&self, delay: usize) -> f32 {
        let len = self.buffer.len();
        self.buffer[(self.write_pos + len - delay) % len]
    }

    #[inline]
    fn write(&mut self, value: f32) {
        self.buffer[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Multi-tap echo
///
/// Parameters:
/// - delay_ms: Spacing between taps (10-1000ms)
/// - feedback: Amount of the first tap fed back (clamped below 1.0)
/// - taps: Number of audible taps (1-3)
/// - mix: Dry/wet balance
pub struct EchoEffect {
    sample_rate: f32,
    max_delay: usize,
    lines: Vec<DelayLine>,
}

impl EchoEffect {
    pub fn new(format: &FrameFormat) -> Self {
        let sample_rate = format.sample_rate() as f32;
        let max_delay = (MAX_DELAY_MS / 1000.0 * sample_rate) as usize;
        let lines = (0..format.channels().min(MAX_CHANNELS))
            .map(|_| DelayLine::new(max_delay * MAX_TAPS + 1))
            .collect();
        Self {
            sample_rate,
            max_delay,
            lines,
        }
    }

    fn delay_samples(&self, ms: f32) -> usize {
        ((ms / 1000.0 * self.sample_rate) as usize).clamp(1, self.max_delay)
    }
}

impl Effect for EchoEffect {
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault> {
        let delay = self.delay_samples(params.get(DELAY_MS));
        let feedback = clamp_feedback(params.get(FEEDBACK));
        let taps = (params.get(TAPS).round() as usize).clamp(1, MAX_TAPS);
        let mix = params.get(MIX).clamp(0.0, 1.0);
        let dry = 1.0 - mix;

        for group in frame.iter_frames_mut() {
            for (sample, line) in group.iter_mut().zip(&mut self.lines) {
                let mut wet = 0.0;
                for (k, gain) in TAP_GAINS.iter().enumerate().take(taps) {
                    wet += line.tap(delay * (k + 1)) * gain;
                }
                let first = line.tap(delay);
                line.write(*sample + first * feedback);
                *sample = *sample * dry + wet * mix;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
    }

    fn info(&self) -> &'static EffectInfo {
        &ECHO_INFO
    }
}
