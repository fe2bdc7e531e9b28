//! Playback engine: zone matching, voice lifetime and the render loop.
//!
//! Two threads use an [`Engine`]. The control thread triggers, releases and
//! kills voices, changes settings and swaps banks or scales. The render
//! thread calls [`Engine::render`] once per output buffer. The active voice
//! list is the only state both touch per sample and sits behind one mutex;
//! everything else is either atomic or read once per call.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::bank::{PresetKey, Sample, SoundBank, Zone};
use crate::config::{EnvelopeOverrides, ParamKey, PlayerState, SamplingMode};
use crate::error::{Error, Result};
use crate::scale::Scale;

use super::channel::{ChannelParams, StereoFrame};
use super::oscillator::WavetableOscillator;
use super::voice::{Voice, VoiceHandle, VoiceTag};

/// Sample rate used until the host sets one.
pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;

/// Settings read at trigger time and once per render call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Settings {
    preset: PresetKey,
    overrides: EnvelopeOverrides,
    sampling_mode: SamplingMode,
}

/// State shared with the render thread.
#[derive(Debug, Default)]
struct PlayState {
    voices: Vec<Voice>,
    /// Voices retired by render, dropped on the control thread.
    graveyard: Vec<Voice>,
    next_handle: u64,
}

/// A polyphonic soundfont player.
#[derive(Debug)]
pub struct Engine {
    bank: RwLock<Arc<SoundBank>>,
    scale: RwLock<Arc<Scale>>,
    settings: RwLock<Settings>,
    sample_rate: AtomicF32,
    /// Global pitch wheel in semitones.
    pitch_wheel: AtomicF32,
    play: Mutex<PlayState>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(DEFAULT_SAMPLE_RATE)
    }
}

impl Engine {
    pub fn new(sample_rate: f32) -> Self {
        let rate = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };
        Engine {
            bank: RwLock::new(Arc::new(SoundBank::default())),
            scale: RwLock::new(Arc::new(Scale::default())),
            settings: RwLock::new(Settings::default()),
            sample_rate: AtomicF32::new(rate),
            pitch_wheel: AtomicF32::new(0.0),
            play: Mutex::new(PlayState::default()),
        }
    }

    // ── Bank & preset ───────────────────────────────────────

    /// Install a new bank.
    ///
    /// Every sounding oscillator is switched off; voices retire over the
    /// following renders. Oscillators hold their own sample handles, so the
    /// old bank's data stays valid until they are gone.
    pub fn load_bank(&self, bank: SoundBank) {
        let presets = bank.presets().count();
        let path = bank.source_path().unwrap_or("<memory>").to_string();
        *self.bank.write() = Arc::new(bank);
        {
            let mut play = self.play.lock();
            for voice in &mut play.voices {
                voice.stop();
            }
        }
        info!("loaded bank {path} with {presets} presets");

        let selected = self.settings.read().preset;
        if self.bank().preset(selected).is_none() {
            warn!(
                "selected preset {:03}:{:03} is not in the new bank",
                selected.bank(),
                selected.program()
            );
        }
    }

    pub fn bank(&self) -> Arc<SoundBank> {
        self.bank.read().clone()
    }

    /// Select the preset notes will play.
    ///
    /// The key is remembered even when the current bank lacks it, so a bank
    /// loaded later can satisfy it; the error tells the host it is silent
    /// for now.
    pub fn select_preset(&self, key: PresetKey) -> Result<()> {
        self.settings.write().preset = key;
        if self.bank().preset(key).is_none() {
            warn!("no preset at {:03}:{:03}", key.bank(), key.program());
            return Err(Error::InvalidSelection {
                bank: key.bank(),
                program: key.program(),
            });
        }
        Ok(())
    }

    pub fn set_bank_program(&self, bank: u8, program: u8) -> Result<()> {
        self.select_preset(PresetKey::new(bank, program))
    }

    pub fn selected_preset(&self) -> PresetKey {
        self.settings.read().preset
    }

    // ── Scale ───────────────────────────────────────────────

    pub fn set_scale(&self, scale: Scale) {
        info!("scale set to '{}'", scale.description());
        *self.scale.write() = Arc::new(scale);
    }

    /// Parse and install Scala text. On error the current scale stays.
    pub fn load_scale(&self, text: &str) -> Result<()> {
        match Scale::parse(text) {
            Ok(scale) => {
                self.set_scale(scale);
                Ok(())
            }
            Err(err) => {
                warn!("rejected scale: {err}");
                Err(err.into())
            }
        }
    }

    /// Go back to 12-tone equal temperament.
    pub fn reset_scale(&self) {
        self.set_scale(Scale::equal_temperament());
    }

    pub fn scale(&self) -> Arc<Scale> {
        self.scale.read().clone()
    }

    // ── Parameters ──────────────────────────────────────────

    /// Set the output rate in Hz. Non-positive or non-finite rates are ignored.
    pub fn set_sample_rate(&self, rate: f32) {
        if !(rate.is_finite() && rate > 0.0) {
            warn!("ignoring sample rate {rate}");
            return;
        }
        self.sample_rate.store(rate, Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Pitch wheel offset in semitones, applied to every sounding oscillator.
    pub fn set_pitch_wheel(&self, semitones: f32) {
        self.pitch_wheel.store(semitones, Ordering::Relaxed);
    }

    pub fn pitch_wheel(&self) -> f32 {
        self.pitch_wheel.load(Ordering::Relaxed)
    }

    pub fn set_overrides(&self, overrides: EnvelopeOverrides) {
        self.settings.write().overrides = overrides;
    }

    pub fn overrides(&self) -> EnvelopeOverrides {
        self.settings.read().overrides
    }

    pub fn set_sampling_mode(&self, mode: SamplingMode) {
        self.settings.write().sampling_mode = mode;
    }

    pub fn sampling_mode(&self) -> SamplingMode {
        self.settings.read().sampling_mode
    }

    /// Set one host parameter. Envelope overrides only affect notes triggered
    /// afterwards.
    pub fn set_param(&self, key: ParamKey, value: f64) -> Result<()> {
        match key {
            ParamKey::Bank | ParamKey::Program => {
                let current = self.selected_preset();
                let byte = value.clamp(0.0, 255.0) as u8;
                let next = if key == ParamKey::Bank {
                    PresetKey::new(byte, current.program())
                } else {
                    PresetKey::new(current.bank(), byte)
                };
                return self.select_preset(next);
            }
            ParamKey::SamplingMode => {
                self.set_sampling_mode(SamplingMode::from_index(value as i64));
                return Ok(());
            }
            _ => {}
        }

        let mut settings = self.settings.write();
        let overrides = &mut settings.overrides;
        let slot = match key {
            ParamKey::Delay => &mut overrides.delay,
            ParamKey::Attack => &mut overrides.attack,
            ParamKey::Hold => &mut overrides.hold,
            ParamKey::Decay => &mut overrides.decay,
            ParamKey::Sustain => &mut overrides.sustain,
            ParamKey::Release => &mut overrides.release,
            ParamKey::SamplingMode | ParamKey::Bank | ParamKey::Program => return Ok(()),
        };
        *slot = value;
        Ok(())
    }

    /// Set a parameter by its stable string key.
    pub fn set_param_by_name(&self, name: &str, value: f64) -> Result<()> {
        let key = name.parse::<ParamKey>().inspect_err(|_| {
            warn!("unknown parameter '{name}'");
        })?;
        self.set_param(key, value)
    }

    /// Current value of a host parameter.
    pub fn param(&self, key: ParamKey) -> f64 {
        let settings = *self.settings.read();
        let overrides = settings.overrides;
        match key {
            ParamKey::Delay => overrides.delay,
            ParamKey::Attack => overrides.attack,
            ParamKey::Hold => overrides.hold,
            ParamKey::Decay => overrides.decay,
            ParamKey::Sustain => overrides.sustain,
            ParamKey::Release => overrides.release,
            ParamKey::SamplingMode => settings.sampling_mode as u8 as f64,
            ParamKey::Bank => settings.preset.bank() as f64,
            ParamKey::Program => settings.preset.program() as f64,
        }
    }

    // ── Notes ───────────────────────────────────────────────

    /// Start a note. `channel` carries the note's live levels; `tag` comes
    /// back from [`Engine::render`] when the voice retires.
    ///
    /// Returns `None` when no preset is selected or no zone covers the
    /// note's key and velocity.
    pub fn trigger(&self, channel: Arc<ChannelParams>, tag: VoiceTag) -> Option<VoiceHandle> {
        let bank = self.bank();
        let scale = self.scale();
        let settings = *self.settings.read();

        let Some(preset) = bank.preset(settings.preset) else {
            debug!("trigger ignored: no preset selected");
            return None;
        };

        let played_key = channel.key();
        let velocity = channel.velocity();
        let matched_key = scale.corrected_key(played_key).round().clamp(0.0, 127.0) as u8;

        let ctx = TriggerContext {
            scale: &scale,
            overrides: settings.overrides,
            sample_rate: self.sample_rate() as f64,
        };
        let oscillators: Vec<WavetableOscillator> = preset
            .zones
            .iter()
            .filter(|zone| zone.matches(matched_key, velocity))
            .filter_map(|zone| {
                let sample = bank.sample(zone.sample_index)?;
                Some(ctx.oscillator(zone, sample, &channel, played_key, velocity))
            })
            .collect();

        if oscillators.is_empty() {
            debug!("no zone for key {played_key} (matched as {matched_key}) velocity {velocity}");
            return None;
        }
        debug!(
            "trigger key {played_key} velocity {velocity}: {} zones",
            oscillators.len()
        );

        let mut play = self.play.lock();
        let retired = std::mem::take(&mut play.graveyard);
        let handle = VoiceHandle(play.next_handle);
        play.next_handle += 1;
        play.voices.push(Voice::new(handle, tag, oscillators));
        // Render moves at most every current voice into the graveyard.
        let needed = play.voices.len();
        play.graveyard.reserve(needed);
        drop(play);

        // Retired voices are freed here, after the render thread is unblocked.
        drop(retired);
        Some(handle)
    }

    /// Release a voice. Unknown handles are ignored.
    pub fn release(&self, handle: VoiceHandle) {
        let mut play = self.play.lock();
        if let Some(voice) = play.voices.iter_mut().find(|v| v.handle() == handle) {
            debug!("release voice {}", handle.0);
            voice.release();
        }
    }

    /// Silence a voice immediately. Unknown handles are ignored.
    pub fn kill(&self, handle: VoiceHandle) {
        let mut play = self.play.lock();
        if let Some(voice) = play.voices.iter_mut().find(|v| v.handle() == handle) {
            debug!("kill voice {}", handle.0);
            voice.kill();
        }
    }

    /// Silence every voice immediately.
    pub fn kill_all(&self) {
        let mut play = self.play.lock();
        for voice in &mut play.voices {
            voice.kill();
        }
    }

    /// Number of voices not yet retired.
    pub fn active_voices(&self) -> usize {
        self.play.lock().voices.len()
    }

    // ── Render ──────────────────────────────────────────────

    /// Fill `out` with `frames` interleaved stereo frames.
    ///
    /// Output is overwritten, not mixed into. At most one finished voice is
    /// retired per call; its tag is returned so the host can forget the note.
    /// If `out` is shorter than `frames * 2`, only whole frames that fit are
    /// written.
    pub fn render(&self, out: &mut [f32], frames: usize) -> Option<VoiceTag> {
        let dt = 1.0 / self.sample_rate();
        let pitch_wheel = self.pitch_wheel();
        let mode = self.settings.read().sampling_mode;

        let mut play = self.play.lock();
        let PlayState {
            voices, graveyard, ..
        } = &mut *play;

        for frame in out.chunks_exact_mut(2).take(frames) {
            let mut total = StereoFrame::SILENCE;
            for voice in voices.iter_mut() {
                total += voice.get_sample(dt, pitch_wheel, mode);
            }
            frame[0] = total.left;
            frame[1] = total.right;
        }

        let index = voices.iter().position(Voice::is_finished)?;
        let voice = voices.swap_remove(index);
        let tag = voice.tag();
        if graveyard.len() < graveyard.capacity() {
            graveyard.push(voice);
        } else {
            // Only reachable if voices were added without going through
            // `trigger`; put it back and retire it next call instead of
            // allocating here.
            voices.push(voice);
            return None;
        }
        Some(tag)
    }

    // ── Persistence ─────────────────────────────────────────

    /// Snapshot of everything that persists.
    pub fn player_state(&self) -> PlayerState {
        let settings = *self.settings.read();
        PlayerState {
            bank_path: self.bank().source_path().map(str::to_string),
            preset: settings.preset,
            overrides: settings.overrides,
            sampling_mode: settings.sampling_mode,
            scale: self.scale().source().clone(),
        }
    }

    pub fn save_state(&self) -> Result<String> {
        self.player_state().to_json()
    }

    /// Restore settings and scale from [`Engine::save_state`] output.
    ///
    /// Nothing changes if the state cannot be decoded or its scale cannot be
    /// rebuilt. The bank is not loaded here; the returned state carries
    /// `bank_path` for the host to load.
    pub fn restore_state(&self, json: &str) -> Result<PlayerState> {
        let state = PlayerState::from_json(json)?;
        let scale = Scale::from_source(&state.scale)?;

        *self.scale.write() = Arc::new(scale);
        *self.settings.write() = Settings {
            preset: state.preset,
            overrides: state.overrides,
            sampling_mode: state.sampling_mode,
        };
        info!(
            "restored state: preset {:03}:{:03}, {:?} sampling",
            state.preset.bank(),
            state.preset.program(),
            state.sampling_mode
        );
        Ok(state)
    }
}

/// Everything a new oscillator needs besides its zone and sample.
struct TriggerContext<'a> {
    scale: &'a Scale,
    overrides: EnvelopeOverrides,
    sample_rate: f64,
}

impl TriggerContext<'_> {
    fn oscillator(
        &self,
        zone: &Zone,
        sample: &Sample,
        channel: &Arc<ChannelParams>,
        key: u8,
        velocity: u8,
    ) -> WavetableOscillator {
        let mut zone = zone.clone();
        self.overrides.apply(&mut zone.vol_env);

        let key = zone.key_override.filter(|k| *k < 128).unwrap_or(key);
        let velocity = zone.velocity_override.filter(|v| *v < 128).unwrap_or(velocity);

        zone.vol_env.apply_key_scaling(key);
        zone.mod_env.apply_key_scaling(key);

        let key_multiplier = self.scale.multiplier(key).powf(zone.scale_tuning as f64);
        let pitch_correction = zone.root_key_offset as f64 + zone.fine_tune as f64;
        let sample_delta = sample.base_sample_rate as f64
            * key_multiplier
            * (pitch_correction / 12.0).exp2()
            / self.sample_rate;

        WavetableOscillator::new(sample, zone, channel.clone(), key, velocity, sample_delta)
    }
}
