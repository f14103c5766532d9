//! Chorus effect - LFO-modulated short delay

use std::f64::consts::TAU;

use crate::effect::{Effect, EffectFault, EffectInfo, ParamInfo};
use crate::params::ModuleParams;
use crate::types::{Frame, FrameFormat, MAX_CHANNELS};

/// Fixed delay the modulation swings around
const BASE_DELAY_MS: f32 = 7.0;

const MAX_DEPTH_MS: f32 = 10.0;

const DEPTH_MS: usize = 0;
const RATE_HZ: usize = 1;
const MIX: usize = 2;

static PARAMS: [ParamInfo; 3] = [
    ParamInfo::new("depth_ms", 2.0).with_range(0.0, MAX_DEPTH_MS).with_unit("ms"),
    ParamInfo::new("rate_hz", 1.5).with_range(0.05, 5.0).with_unit("Hz"),
    ParamInfo::new("mix", 0.5),
];

pub static CHORUS_INFO: EffectInfo = EffectInfo {
    name: "Chorus",
    category: "Modulation",
    params: &PARAMS,
};

/// Single-voice chorus
///
/// Parameters:
/// - depth_ms: Modulation depth of the delay time
/// - rate_hz: LFO rate
/// - mix: Dry/wet balance
///
/// In stereo sessions the right channel's LFO runs a quarter cycle ahead.
pub struct ChorusEffect {
    sample_rate: f32,
    buffers: Vec<Vec<f32>>,
    write_pos: usize,
    lfo_phase: f64,
}

impl ChorusEffect {
    pub fn new(format: &FrameFormat) -> Self {
        let sample_rate = format.sample_rate() as f32;
        let len = ((BASE_DELAY_MS + MAX_DEPTH_MS) / 1000.0 * sample_rate) as usize + 4;
        Self {
            sample_rate,
            buffers: (0..format.channels().min(MAX_CHANNELS)).map(|_| vec![0.0; len]).collect(),
            write_pos: 0,
            lfo_phase: 0.0,
        }
    }

    /// Linear-interpolated read `delay` samples behind the write head
    #[inline]
    fn read(buffer: &[f32], write_pos: usize, delay: f32) -> f32 {
        let len = buffer.len();
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;
        let a = buffer[(write_pos + len - whole) % len];
        let b = buffer[(write_pos + len - whole - 1) % len];
        a + (b - a) * frac
    }
}

impl Effect for ChorusEffect {
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault> {
        let ms = self.sample_rate / 1000.0;
        let base = BASE_DELAY_MS * ms;
        let depth = params.get(DEPTH_MS).clamp(0.0, MAX_DEPTH_MS) * ms;
        let increment = params.get(RATE_HZ).max(0.0) as f64 / self.sample_rate as f64;
        let mix = params.get(MIX).clamp(0.0, 1.0);
        let dry = 1.0 - mix;

        for group in frame.iter_frames_mut() {
            for (ch, (sample, buffer)) in group.iter_mut().zip(&mut self.buffers).enumerate() {
                let phase = self.lfo_phase + ch as f64 * 0.25;
                let lfo = 0.5 + 0.5 * (phase * TAU).sin() as f32;
                let delay = (base + depth * lfo).max(1.0);

                buffer[self.write_pos] = *sample;
                let wet = Self::read(buffer, self.write_pos, delay);
                *sample = *sample * dry + wet * mix;
            }
            self.write_pos = (self.write_pos + 1) % self.buffers[0].len();
            self.lfo_phase += increment;
            if self.lfo_phase >= 1.0 {
                self.lfo_phase -= 1.0;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write_pos = 0;
        self.lfo_phase = 0.0;
    }

    fn info(&self) -> &'static EffectInfo {
        &CHORUS_INFO
    }
}
