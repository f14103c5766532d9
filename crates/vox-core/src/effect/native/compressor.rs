//! Compressor effect - feed-forward peak compressor

use crate::effect::{Effect, EffectFault, EffectInfo, ParamInfo};
use crate::params::ModuleParams;
use crate::types::{Frame, FrameFormat};

const THRESHOLD_DB: usize = 0;
const RATIO: usize = 1;
const ATTACK_MS: usize = 2;
const RELEASE_MS: usize = 3;
const MAKEUP_DB: usize = 4;

static PARAMS: [ParamInfo; 5] = [
    ParamInfo::new("threshold_db", -18.0).with_range(-60.0, 0.0).with_unit("dB"),
    ParamInfo::new("ratio", 4.0).with_range(1.0, 20.0).with_unit(":1"),
    ParamInfo::new("attack_ms", 5.0).with_range(0.1, 200.0).with_unit("ms"),
    ParamInfo::new("release_ms", 80.0).with_range(5.0, 2000.0).with_unit("ms"),
    ParamInfo::new("makeup_db", 0.0).with_range(0.0, 24.0).with_unit("dB"),
];

pub static COMPRESSOR_INFO: EffectInfo = EffectInfo {
    name: "Compressor",
    category: "Dynamics",
    params: &PARAMS,
};

#[inline]
fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

#[inline]
fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-9).log10()
}

/// One-pole smoothing coefficient for a time constant in ms
#[inline]
fn time_coeff(ms: f32, sample_rate: f32) -> f32 {
    (-1.0 / (ms.max(0.01) / 1000.0 * sample_rate)).exp()
}

/// Peak compressor with a linked detector
///
/// Parameters:
/// - threshold_db: Level above which gain reduction starts
/// - ratio: Input dB over threshold per output dB
/// - attack_ms / release_ms: Envelope follower time constants
/// - makeup_db: Gain applied after compression
///
/// All channels share one envelope so the stereo image does not shift.
pub struct CompressorEffect {
    sample_rate: f32,
    envelope: f32,
}

impl CompressorEffect {
    pub fn new(format: &FrameFormat) -> Self {
        Self {
            sample_rate: format.sample_rate() as f32,
            envelope: 0.0,
        }
    }

    /// Current envelope level (linear)
    pub fn envelope(&self) -> f32 {
        self.envelope
    }
}

impl Effect for CompressorEffect {
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault> {
        let threshold = params.get(THRESHOLD_DB);
        let ratio = params.get(RATIO).max(1.0);
        let attack = time_coeff(params.get(ATTACK_MS), self.sample_rate);
        let release = time_coeff(params.get(RELEASE_MS), self.sample_rate);
        let makeup = db_to_gain(params.get(MAKEUP_DB));
        let slope = 1.0 - 1.0 / ratio;

        for group in frame.iter_frames_mut() {
            let level = group.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            let coeff = if level > self.envelope { attack } else { release };
            self.envelope = level + coeff * (self.envelope - level);

            let over = gain_to_db(self.envelope) - threshold;
            let gain = if over > 0.0 { db_to_gain(-over * slope) } else { 1.0 } * makeup;
            for sample in group {
                *sample *= gain;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }

    fn info(&self) -> &'static EffectInfo {
        &COMPRESSOR_INFO
    }
}
