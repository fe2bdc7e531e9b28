//! Instrument bank types.
//!
//! These are the records a soundfont loader hands to the engine: samples,
//! presets, and the zones inside them. Everything here is immutable once the
//! bank is built; oscillators take their own copies of zones at trigger time.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BankError;

// ── Samples ─────────────────────────────────────────────────

/// How a sample's channel relates to its linked partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    #[default]
    Mono,
    /// Primary data is the left channel, linked data the right.
    Left,
    /// Primary data is the right channel, linked data the left.
    Right,
    /// Generic linked sample. Played as mono from the primary data.
    Linked,
}

impl SampleType {
    /// Whether this sample has a second channel to fetch.
    pub fn is_stereo(self) -> bool {
        matches!(self, SampleType::Left | SampleType::Right)
    }
}

/// 16-bit PCM sample data owned by a bank.
///
/// The PCM arrays are reference counted so zones and playing oscillators can
/// hold on to them without copying, and so replacing a bank never pulls data
/// out from under a voice that is still sounding.
#[derive(Debug, Clone)]
pub struct Sample {
    pub name: String,
    pub data: Arc<[i16]>,
    /// Partner channel for stereo samples.
    pub linked: Option<Arc<[i16]>>,
    /// Number of playable frames.
    pub length: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    /// Rate the sample was recorded at, in Hz.
    pub base_sample_rate: f32,
    pub sample_type: SampleType,
}

impl Sample {
    /// Create a mono sample spanning all of `data`, with no loop.
    pub fn mono(name: impl Into<String>, data: Vec<i16>, base_sample_rate: f32) -> Self {
        let length = data.len() as u32;
        Sample {
            name: name.into(),
            data: data.into(),
            linked: None,
            length,
            loop_start: 0,
            loop_end: length,
            base_sample_rate,
            sample_type: SampleType::Mono,
        }
    }

    /// Create a stereo pair where `primary` plays on the side given by `sample_type`.
    pub fn stereo(
        name: impl Into<String>,
        primary: Vec<i16>,
        linked: Vec<i16>,
        base_sample_rate: f32,
        sample_type: SampleType,
    ) -> Self {
        let mut sample = Sample::mono(name, primary, base_sample_rate);
        sample.linked = Some(linked.into());
        sample.sample_type = sample_type;
        sample
    }

    /// Set loop points (in frames).
    pub fn with_loop(mut self, start: u32, end: u32) -> Self {
        self.loop_start = start;
        self.loop_end = end;
        self
    }

    fn validate(&self, index: usize) -> Result<(), BankError> {
        if (self.data.len() as u64) < self.length as u64 {
            return Err(BankError::SampleTooShort { index });
        }
        if self.sample_type.is_stereo() {
            match &self.linked {
                Some(linked) if linked.len() >= self.length as usize => {}
                Some(_) => return Err(BankError::SampleTooShort { index }),
                None => return Err(BankError::LinkedDataMissing { index }),
            }
        }
        Ok(())
    }
}

// ── Zone parameters ─────────────────────────────────────────

/// Six-stage envelope parameters.
///
/// Timed stages (`delay`, `attack`, `hold`) are rates in 1/seconds.
/// `decay` and `release` are rates in envelope units per second over the
/// 100-unit range between peak and floor. A rate of zero means the stage
/// takes no time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopeParams {
    pub delay: f32,
    pub attack: f32,
    pub hold: f32,
    pub decay: f32,
    /// Volume envelopes: attenuation below peak in dB.
    /// Modulation envelopes: fractional decrease in [0, 1].
    pub sustain: f32,
    pub release: f32,
    /// Key scaling of the hold rate, in cents per key away from 60.
    pub key_to_hold: f32,
    /// Key scaling of the decay rate, in cents per key away from 60.
    pub key_to_decay: f32,
}

impl EnvelopeParams {
    /// Build parameters from stage durations in seconds.
    pub fn from_seconds(
        delay: f32,
        attack: f32,
        hold: f32,
        decay: f32,
        sustain: f32,
        release: f32,
    ) -> Self {
        EnvelopeParams {
            delay: reciprocal(delay, 1.0),
            attack: reciprocal(attack, 1.0),
            hold: reciprocal(hold, 1.0),
            decay: reciprocal(decay, 100.0),
            sustain,
            release: reciprocal(release, 100.0),
            key_to_hold: 0.0,
            key_to_decay: 0.0,
        }
    }

    /// Scale hold and decay for the key being played.
    pub fn apply_key_scaling(&mut self, key: u8) {
        let offset = key as f32 - 60.0;
        self.hold *= 2.0_f32.powf(self.key_to_hold * offset / 1200.0);
        self.decay *= 2.0_f32.powf(self.key_to_decay * offset / 1200.0);
    }
}

fn reciprocal(seconds: f32, scale: f32) -> f32 {
    if seconds > 0.0 { scale / seconds } else { 0.0 }
}

/// Low-frequency oscillator parameters and routing depths.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LfoParams {
    /// Frequency in Hz.
    pub rate: f32,
    /// Seconds before the LFO starts moving.
    pub delay: f32,
    /// Cents at full swing.
    pub to_pitch: f32,
    /// Cents of cutoff shift at full swing.
    pub to_filter: f32,
    /// Envelope units (6 per doubling) at full swing.
    pub to_volume: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterParams {
    /// Cutoff in Hz.
    pub cutoff: f32,
    pub resonance: f32,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            cutoff: crate::dsp::filter::FILTER_OPEN_HZ,
            resonance: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub low: u8,
    pub high: u8,
}

impl KeyRange {
    pub const FULL: KeyRange = KeyRange { low: 0, high: 127 };

    pub fn contains(&self, value: u8) -> bool {
        value >= self.low && value <= self.high
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        KeyRange::FULL
    }
}

/// Per-zone adjustments to a sample's start, end, and loop points, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SampleOffsets {
    pub start: i32,
    pub end: i32,
    pub loop_start: i32,
    pub loop_end: i32,
}

// ── Zones & presets ─────────────────────────────────────────

/// One key/velocity region of a preset, mapped to a single sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Zone {
    pub key_range: KeyRange,
    pub velocity_range: KeyRange,
    pub sample_index: usize,
    /// Semitones added to the played pitch to land on the sample's root.
    pub root_key_offset: f32,
    /// Fine tuning in semitones.
    pub fine_tune: f32,
    /// Pitch tracking factor; 1.0 is one scale step per key.
    pub scale_tuning: f32,
    /// Replaces the played key for pitch and key scaling when set.
    pub key_override: Option<u8>,
    /// Replaces the played velocity when set.
    pub velocity_override: Option<u8>,
    pub loop_enable: bool,
    pub offsets: SampleOffsets,
    /// Static pan in [-1, 1].
    pub pan: f32,
    /// Attenuation applied at 2^(-x/15).
    pub initial_attenuation: f32,
    pub vol_env: EnvelopeParams,
    pub mod_env: EnvelopeParams,
    /// Cents at full modulation envelope.
    pub mod_env_to_pitch: f32,
    /// Cents of cutoff shift at full modulation envelope.
    pub mod_env_to_filter: f32,
    pub vib_lfo: LfoParams,
    pub mod_lfo: LfoParams,
    pub filter: FilterParams,
}

impl Default for Zone {
    fn default() -> Self {
        Zone {
            key_range: KeyRange::FULL,
            velocity_range: KeyRange::FULL,
            sample_index: 0,
            root_key_offset: 0.0,
            fine_tune: 0.0,
            scale_tuning: 1.0,
            key_override: None,
            velocity_override: None,
            loop_enable: false,
            offsets: SampleOffsets::default(),
            pan: 0.0,
            initial_attenuation: 0.0,
            vol_env: EnvelopeParams::default(),
            mod_env: EnvelopeParams::default(),
            mod_env_to_pitch: 0.0,
            mod_env_to_filter: 0.0,
            vib_lfo: LfoParams::default(),
            mod_lfo: LfoParams::default(),
            filter: FilterParams::default(),
        }
    }
}

impl Zone {
    /// Whether a note with this key and velocity should sound this zone.
    pub fn matches(&self, key: u8, velocity: u8) -> bool {
        self.key_range.contains(key) && self.velocity_range.contains(velocity)
    }
}

/// Preset address: `bank << 8 | program`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetKey(pub u16);

impl PresetKey {
    pub fn new(bank: u8, program: u8) -> Self {
        PresetKey(((bank as u16) << 8) | program as u16)
    }

    pub fn bank(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn program(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

#[derive(Debug, Clone, Default)]
pub struct Preset {
    pub name: String,
    pub zones: Vec<Zone>,
}

impl Preset {
    pub fn new(name: impl Into<String>, zones: Vec<Zone>) -> Self {
        Preset {
            name: name.into(),
            zones,
        }
    }
}

// ── Bank ────────────────────────────────────────────────────

/// A validated set of presets and the samples they reference.
#[derive(Debug, Clone, Default)]
pub struct SoundBank {
    presets: BTreeMap<PresetKey, Preset>,
    samples: Vec<Sample>,
    source_path: Option<String>,
}

impl SoundBank {
    /// Build a bank, rejecting it if any zone points at missing sample data.
    pub fn new(
        presets: BTreeMap<PresetKey, Preset>,
        samples: Vec<Sample>,
    ) -> Result<Self, BankError> {
        for (index, sample) in samples.iter().enumerate() {
            sample.validate(index)?;
        }
        for (key, preset) in &presets {
            for (zone_index, zone) in preset.zones.iter().enumerate() {
                if zone.sample_index >= samples.len() {
                    return Err(BankError::SampleIndexOutOfRange {
                        preset: key.0,
                        zone: zone_index,
                        index: zone.sample_index,
                    });
                }
            }
        }
        Ok(SoundBank {
            presets,
            samples,
            source_path: None,
        })
    }

    /// Remember where the bank came from so it can be reloaded with saved state.
    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    pub fn preset(&self, key: PresetKey) -> Option<&Preset> {
        self.presets.get(&key)
    }

    pub fn sample(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn presets(&self) -> impl Iterator<Item = (PresetKey, &Preset)> {
        self.presets.iter().map(|(k, p)| (*k, p))
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Menu entries for every preset, in key order, labelled `BBB:PPP - Name`.
    pub fn preset_list(&self) -> Vec<(PresetKey, String)> {
        self.presets
            .iter()
            .map(|(key, preset)| {
                (
                    *key,
                    format!("{:03}:{:03} - {}", key.bank(), key.program(), preset.name),
                )
            })
            .collect()
    }
}
