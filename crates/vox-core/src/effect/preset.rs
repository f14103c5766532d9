//! Voice presets - named chain layouts with parameter values
//!
//! A [`PresetDocument`] describes a whole chain: which effect kinds, in
//! which order, enabled or not, and the values of their parameters. The
//! built-in [`VoicePreset`]s produce such documents; user presets are
//! plain serde data and can be stored in whatever format the caller likes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EffectKind, MAX_MODULES};

/// Reasons a preset document is rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PresetError {
    #[error("Preset has {0} modules (max {max})", max = MAX_MODULES)]
    TooManyModules(usize),

    #[error("{kind} has no parameter '{name}'")]
    UnknownParam { kind: EffectKind, name: String },

    #[error("Invalid preset document: {0}")]
    Parse(String),
}

fn enabled_default() -> bool {
    true
}

/// One module of a preset chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetModule {
    pub kind: EffectKind,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Parameter overrides by name; missing parameters use their defaults
    #[serde(default)]
    pub params: BTreeMap<String, f32>,
}

impl PresetModule {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            enabled: true,
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f32) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }
}

/// Serializable chain layout plus parameter values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub modules: Vec<PresetModule>,
}

impl PresetDocument {
    /// Check the layout fits a chain and every parameter name exists
    pub fn validate(&self) -> Result<(), PresetError> {
        if self.modules.len() > MAX_MODULES {
            return Err(PresetError::TooManyModules(self.modules.len()));
        }
        for module in &self.modules {
            let info = module.kind.info();
            if let Some(name) = module.params.keys().find(|name| info.param_index(name).is_none()) {
                return Err(PresetError::UnknownParam {
                    kind: module.kind,
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, PresetError> {
        serde_yaml::to_string(self).map_err(|e| PresetError::Parse(e.to_string()))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, PresetError> {
        let doc: Self = serde_yaml::from_str(yaml).map_err(|e| PresetError::Parse(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }
}

/// Built-in voice presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoicePreset {
    Demon,
    Robot,
    Underwater,
    WalkieTalkie,
    Alien,
    Helium,
    DeepVoice,
    EchoChamber,
    Telephone,
    Megaphone,
}

/// Pitch ratio to semitones
fn semitones(ratio: f32) -> f32 {
    12.0 * ratio.log2()
}

/// Linear threshold to dBFS
fn threshold_db(level: f32) -> f32 {
    20.0 * level.log10()
}

/// Echo delay used by every preset (8000 samples at 44.1kHz)
const PRESET_ECHO_MS: f32 = 181.4;

/// Compact description of one built-in preset
struct Recipe {
    gain: f32,
    echo: f32,
    low_pass: bool,
    high_pass: bool,
    robot: bool,
    reverb: bool,
    pitch: f32,
    /// (depth in seconds, rate in Hz)
    chorus: Option<(f32, f32)>,
    distortion: f32,
    /// (linear threshold, ratio)
    compression: Option<(f32, f32)>,
}

const FLAT: Recipe = Recipe {
    gain: 1.0,
    echo: 0.0,
    low_pass: false,
    high_pass: false,
    robot: false,
    reverb: false,
    pitch: 1.0,
    chorus: None,
    distortion: 0.0,
    compression: None,
};

impl Recipe {
    fn modules(&self) -> Vec<PresetModule> {
        let mut modules = vec![PresetModule::new(EffectKind::Gain).with("gain", self.gain)];
        if self.echo > 0.0 {
            modules.push(
                PresetModule::new(EffectKind::Echo)
                    .with("delay_ms", PRESET_ECHO_MS)
                    .with("feedback", 0.0)
                    .with("taps", 1.0)
                    .with("mix", self.echo),
            );
        }
        if self.low_pass {
            modules.push(PresetModule::new(EffectKind::LowPass).with("cutoff", 1000.0));
        }
        if self.high_pass {
            modules.push(PresetModule::new(EffectKind::HighPass).with("cutoff", 300.0));
        }
        if self.robot {
            modules.push(PresetModule::new(EffectKind::Robot).with("carrier_hz", 50.0));
        }
        if self.reverb {
            modules.push(PresetModule::new(EffectKind::Reverb));
        }
        if self.pitch != 1.0 {
            modules.push(PresetModule::new(EffectKind::PitchShift).with("semitones", semitones(self.pitch)));
        }
        if let Some((depth, rate)) = self.chorus {
            modules.push(
                PresetModule::new(EffectKind::Chorus)
                    .with("depth_ms", depth * 1000.0)
                    .with("rate_hz", rate),
            );
        }
        if self.distortion > 0.0 {
            modules.push(PresetModule::new(EffectKind::Distortion).with("drive", 1.0 + self.distortion * 10.0));
        }
        if let Some((threshold, ratio)) = self.compression {
            modules.push(
                PresetModule::new(EffectKind::Compressor)
                    .with("threshold_db", threshold_db(threshold))
                    .with("ratio", ratio),
            );
        }
        modules
    }
}

impl VoicePreset {
    pub const ALL: [VoicePreset; 10] = [
        VoicePreset::Demon,
        VoicePreset::Robot,
        VoicePreset::Underwater,
        VoicePreset::WalkieTalkie,
        VoicePreset::Alien,
        VoicePreset::Helium,
        VoicePreset::DeepVoice,
        VoicePreset::EchoChamber,
        VoicePreset::Telephone,
        VoicePreset::Megaphone,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VoicePreset::Demon => "Demon",
            VoicePreset::Robot => "Robot",
            VoicePreset::Underwater => "Underwater",
            VoicePreset::WalkieTalkie => "Walkie Talkie",
            VoicePreset::Alien => "Alien",
            VoicePreset::Helium => "Helium",
            VoicePreset::DeepVoice => "Deep Voice",
            VoicePreset::EchoChamber => "Echo Chamber",
            VoicePreset::Telephone => "Telephone",
            VoicePreset::Megaphone => "Megaphone",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            VoicePreset::Demon => "Deep, dark, demonic voice",
            VoicePreset::Robot => "Mechanical, robotic voice",
            VoicePreset::Underwater => "Muffled, underwater voice",
            VoicePreset::WalkieTalkie => "Radio communication voice",
            VoicePreset::Alien => "Otherworldly, alien voice",
            VoicePreset::Helium => "High-pitched helium voice",
            VoicePreset::DeepVoice => "Deep, bass-heavy voice",
            VoicePreset::EchoChamber => "Heavy echo and reverb",
            VoicePreset::Telephone => "Band-limited telephone line",
            VoicePreset::Megaphone => "Megaphone / PA system",
        }
    }

    /// Look up a preset by display name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    fn recipe(self) -> Recipe {
        match self {
            VoicePreset::Demon => Recipe {
                gain: 1.2,
                echo: 0.3,
                low_pass: true,
                reverb: true,
                pitch: 0.7,
                distortion: 0.4,
                compression: Some((0.3, 6.0)),
                ..FLAT
            },
            VoicePreset::Robot => Recipe {
                echo: 0.1,
                high_pass: true,
                robot: true,
                distortion: 0.2,
                compression: Some((0.4, 4.0)),
                ..FLAT
            },
            VoicePreset::Underwater => Recipe {
                gain: 0.8,
                echo: 0.2,
                low_pass: true,
                reverb: true,
                pitch: 0.9,
                chorus: Some((0.003, 0.8)),
                ..FLAT
            },
            VoicePreset::WalkieTalkie => Recipe {
                gain: 1.1,
                high_pass: true,
                distortion: 0.3,
                compression: Some((0.5, 3.0)),
                ..FLAT
            },
            VoicePreset::Alien => Recipe {
                gain: 1.3,
                echo: 0.4,
                high_pass: true,
                reverb: true,
                pitch: 1.4,
                chorus: Some((0.005, 2.0)),
                distortion: 0.6,
                compression: Some((0.2, 8.0)),
                ..FLAT
            },
            VoicePreset::Helium => Recipe {
                gain: 0.9,
                high_pass: true,
                pitch: 2.0,
                ..FLAT
            },
            VoicePreset::DeepVoice => Recipe {
                gain: 1.1,
                echo: 0.1,
                low_pass: true,
                pitch: 0.6,
                compression: Some((0.6, 2.0)),
                ..FLAT
            },
            VoicePreset::EchoChamber => Recipe {
                gain: 0.8,
                echo: 0.7,
                reverb: true,
                ..FLAT
            },
            VoicePreset::Telephone => Recipe {
                low_pass: true,
                high_pass: true,
                distortion: 0.1,
                compression: Some((0.7, 2.5)),
                ..FLAT
            },
            VoicePreset::Megaphone => Recipe {
                gain: 1.4,
                high_pass: true,
                distortion: 0.5,
                compression: Some((0.3, 5.0)),
                ..FLAT
            },
        }
    }

    /// Chain layout and values of this preset
    pub fn document(self) -> PresetDocument {
        PresetDocument {
            name: self.name().to_string(),
            description: self.description().to_string(),
            modules: self.recipe().modules(),
        }
    }
}

impl std::fmt::Display for VoicePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
