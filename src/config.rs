//! Player settings shared between the control thread and the render loop.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bank::{EnvelopeParams, PresetKey};
use crate::error::Error;
use crate::scale::ScaleSource;

/// Sample interpolation kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SamplingMode {
    /// Nearest sample, 1 tap.
    #[default]
    Point = 0,
    /// 2-tap linear interpolation.
    Linear = 1,
    /// 4-tap Gaussian interpolation.
    Gaussian = 2,
}

impl SamplingMode {
    /// Map a host index (0, 1, 2) to a mode. Out-of-range indices clamp to
    /// the nearest mode.
    pub fn from_index(index: i64) -> Self {
        match index {
            i64::MIN..=0 => SamplingMode::Point,
            1 => SamplingMode::Linear,
            _ => SamplingMode::Gaussian,
        }
    }
}

/// Volume envelope overrides applied to every new oscillator.
///
/// Durations are in seconds and sustain is an attenuation in dB. A value of
/// zero leaves the zone's own parameter alone.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeOverrides {
    pub delay: f64,
    pub attack: f64,
    pub hold: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl EnvelopeOverrides {
    /// Replace each overridden stage of `env`.
    pub fn apply(&self, env: &mut EnvelopeParams) {
        if self.delay != 0.0 {
            env.delay = (1.0 / self.delay) as f32;
        }
        if self.attack != 0.0 {
            env.attack = (1.0 / self.attack) as f32;
        }
        if self.hold != 0.0 {
            env.hold = (1.0 / self.hold) as f32;
        }
        if self.decay != 0.0 {
            env.decay = (100.0 / self.decay) as f32;
        }
        if self.sustain != 0.0 {
            env.sustain = self.sustain as f32;
        }
        if self.release != 0.0 {
            env.release = (100.0 / self.release) as f32;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == EnvelopeOverrides::default()
    }
}

/// Stable keys for host-facing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    SamplingMode,
    Bank,
    Program,
}

impl ParamKey {
    pub const ALL: [ParamKey; 9] = [
        ParamKey::Delay,
        ParamKey::Attack,
        ParamKey::Hold,
        ParamKey::Decay,
        ParamKey::Sustain,
        ParamKey::Release,
        ParamKey::SamplingMode,
        ParamKey::Bank,
        ParamKey::Program,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKey::Delay => "delay",
            ParamKey::Attack => "attack",
            ParamKey::Hold => "hold",
            ParamKey::Decay => "decay",
            ParamKey::Sustain => "sustain",
            ParamKey::Release => "release",
            ParamKey::SamplingMode => "sampling_mode",
            ParamKey::Bank => "bank",
            ParamKey::Program => "program",
        }
    }
}

impl FromStr for ParamKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::UnknownParameter(s.to_string()))
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything about the player that survives a save/restore cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerState {
    /// Where the host loaded the bank from, so it can load it again.
    pub bank_path: Option<String>,
    pub preset: PresetKey,
    pub overrides: EnvelopeOverrides,
    pub sampling_mode: SamplingMode,
    pub scale: ScaleSource,
}

impl PlayerState {
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}
