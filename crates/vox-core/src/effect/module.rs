//! Effect kinds and the static-dispatch module wrapper

use serde::{Deserialize, Serialize};

use super::native::*;
use super::{Effect, EffectFault, EffectInfo};
use crate::params::ModuleParams;
use crate::types::{Frame, FrameFormat};

/// Every effect the chain can host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    PitchShift,
    Reverb,
    Echo,
    Robot,
    Distortion,
    LowPass,
    HighPass,
    Gain,
    Chorus,
    Compressor,
}

impl EffectKind {
    pub const ALL: [EffectKind; 10] = [
        EffectKind::PitchShift,
        EffectKind::Reverb,
        EffectKind::Echo,
        EffectKind::Robot,
        EffectKind::Distortion,
        EffectKind::LowPass,
        EffectKind::HighPass,
        EffectKind::Gain,
        EffectKind::Chorus,
        EffectKind::Compressor,
    ];

    /// Static schema of this kind
    pub fn info(self) -> &'static EffectInfo {
        match self {
            EffectKind::PitchShift => &PITCH_SHIFT_INFO,
            EffectKind::Reverb => &REVERB_INFO,
            EffectKind::Echo => &ECHO_INFO,
            EffectKind::Robot => &ROBOT_INFO,
            EffectKind::Distortion => &DISTORTION_INFO,
            EffectKind::LowPass => &LOW_PASS_INFO,
            EffectKind::HighPass => &HIGH_PASS_INFO,
            EffectKind::Gain => &GAIN_INFO,
            EffectKind::Chorus => &CHORUS_INFO,
            EffectKind::Compressor => &COMPRESSOR_INFO,
        }
    }

    /// Display name
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Build a fresh instance sized for `format`
    ///
    /// Allocates; call from the control thread only.
    pub fn instantiate(self, format: &FrameFormat) -> EffectModule {
        match self {
            EffectKind::PitchShift => EffectModule::PitchShift(PitchShiftEffect::new(format)),
            EffectKind::Reverb => EffectModule::Reverb(ReverbEffect::new(format)),
            EffectKind::Echo => EffectModule::Echo(EchoEffect::new(format)),
            EffectKind::Robot => EffectModule::Robot(RobotEffect::new(format)),
            EffectKind::Distortion => EffectModule::Distortion(DistortionEffect::new()),
            EffectKind::LowPass => EffectModule::Filter(BiquadFilterEffect::low_pass(format)),
            EffectKind::HighPass => EffectModule::Filter(BiquadFilterEffect::high_pass(format)),
            EffectKind::Gain => EffectModule::Gain(GainEffect::new()),
            EffectKind::Chorus => EffectModule::Chorus(ChorusEffect::new(format)),
            EffectKind::Compressor => EffectModule::Compressor(CompressorEffect::new(format)),
        }
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One effect instance, dispatched by match instead of a trait object
pub enum EffectModule {
    PitchShift(PitchShiftEffect),
    Reverb(ReverbEffect),
    Echo(EchoEffect),
    Robot(RobotEffect),
    Distortion(DistortionEffect),
    Filter(BiquadFilterEffect),
    Gain(GainEffect),
    Chorus(ChorusEffect),
    Compressor(CompressorEffect),
}

macro_rules! dispatch {
    ($self:expr, $effect:ident => $body:expr) => {
        match $self {
            EffectModule::PitchShift($effect) => $body,
            EffectModule::Reverb($effect) => $body,
            EffectModule::Echo($effect) => $body,
            EffectModule::Robot($effect) => $body,
            EffectModule::Distortion($effect) => $body,
            EffectModule::Filter($effect) => $body,
            EffectModule::Gain($effect) => $body,
            EffectModule::Chorus($effect) => $body,
            EffectModule::Compressor($effect) => $body,
        }
    };
}

impl EffectModule {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectModule::PitchShift(_) => EffectKind::PitchShift,
            EffectModule::Reverb(_) => EffectKind::Reverb,
            EffectModule::Echo(_) => EffectKind::Echo,
            EffectModule::Robot(_) => EffectKind::Robot,
            EffectModule::Distortion(_) => EffectKind::Distortion,
            EffectModule::Filter(f) => match f.filter_type() {
                FilterType::LowPass => EffectKind::LowPass,
                FilterType::HighPass => EffectKind::HighPass,
            },
            EffectModule::Gain(_) => EffectKind::Gain,
            EffectModule::Chorus(_) => EffectKind::Chorus,
            EffectModule::Compressor(_) => EffectKind::Compressor,
        }
    }
}

impl Effect for EffectModule {
    #[inline]
    fn process(&mut self, frame: &mut Frame, params: &ModuleParams<'_>) -> Result<(), EffectFault> {
        dispatch!(self, effect => effect.process(frame, params))
    }

    fn reset(&mut self) {
        dispatch!(self, effect => effect.reset())
    }

    fn info(&self) -> &'static EffectInfo {
        dispatch!(self, effect => effect.info())
    }

    fn latency_samples(&self) -> u32 {
        dispatch!(self, effect => effect.latency_samples())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantiate_matches_kind() {
        let format = FrameFormat::default();
        for kind in EffectKind::ALL {
            let module = kind.instantiate(&format);
            assert_eq!(module.kind(), kind);
            assert!(std::ptr::eq(module.info(), kind.info()));
        }
    }

    #[test]
    fn test_every_default_is_in_range() {
        for kind in EffectKind::ALL {
            for param in kind.info().params {
                assert!(param.contains(param.default), "{kind}: {}", param.name);
            }
        }
    }

    #[test]
    fn test_kind_serde_names() {
        let yaml = serde_yaml::to_string(&EffectKind::PitchShift).unwrap();
        assert_eq!(yaml.trim(), "pitch_shift");
        let kind: EffectKind = serde_yaml::from_str("low_pass").unwrap();
        assert_eq!(kind, EffectKind::LowPass);
    }

    #[test]
    fn test_defaults_process_silence() {
        let format = FrameFormat::default();
        for kind in EffectKind::ALL {
            let mut module = kind.instantiate(&format);
            let mut frame = Frame::silence(&format);
            module.process(&mut frame, &ModuleParams::defaults(kind.info())).unwrap();
            assert!(frame.is_finite(), "{kind}");
        }
    }
}
