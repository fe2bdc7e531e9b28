//! Wavetable oscillator: one sample-playback stream with its own envelopes,
//! LFOs and filter.

use std::sync::Arc;

use crate::bank::{Sample, SampleType, Zone};
use crate::config::SamplingMode;

use super::channel::{ChannelParams, StereoFrame};
use super::envelope::EnvelopeState;
use super::filter::LowPassFilter;
use super::interpolation::interpolate;
use super::lfo::LfoState;

/// Scale from 16-bit PCM to [-1, 1].
const PCM_SCALE: f32 = 32767.0;

/// One playback stream for one zone of one note.
///
/// Everything the render path touches is owned or reference counted here,
/// so producing a sample never allocates and never reads shared bank state.
#[derive(Debug, Clone)]
pub struct WavetableOscillator {
    sample: Sample,
    zone: Zone,
    channel: Arc<ChannelParams>,
    /// Channel pitch at trigger; later pitch changes bend relative to it.
    initial_pitch: f32,
    key: u8,
    velocity: u8,

    vol_env: EnvelopeState,
    mod_env: EnvelopeState,
    vib_lfo: LfoState,
    mod_lfo: LfoState,
    filter: LowPassFilter,

    /// Read position in frames, relative to the zone's start offset.
    position: f64,
    /// Frames advanced per output sample before pitch modulation.
    delta: f64,

    // Offset-adjusted sample geometry.
    start: i64,
    length: i64,
    loop_start: i64,
    loop_end: i64,

    kill_scheduled: bool,
}

impl WavetableOscillator {
    /// Start playing `sample` through `zone`.
    ///
    /// `zone` is the oscillator's private copy with overrides and key scaling
    /// already applied; `sample_delta` is the base playback increment.
    pub fn new(
        sample: &Sample,
        zone: Zone,
        channel: Arc<ChannelParams>,
        key: u8,
        velocity: u8,
        sample_delta: f64,
    ) -> Self {
        let offsets = zone.offsets;
        let length = (sample.length as i64 + offsets.end as i64 - offsets.start as i64).max(0);
        let loop_start = sample.loop_start as i64 + offsets.loop_start as i64;
        let loop_end = sample.loop_end as i64 + offsets.loop_end as i64;
        let delta = if sample_delta.is_finite() {
            sample_delta.max(0.0)
        } else {
            0.0
        };

        WavetableOscillator {
            sample: sample.clone(),
            initial_pitch: channel.pitch(),
            channel,
            key,
            velocity,
            vol_env: EnvelopeState::triggered(),
            mod_env: EnvelopeState::triggered(),
            vib_lfo: LfoState::default(),
            mod_lfo: LfoState::default(),
            filter: LowPassFilter::from_params(&zone.filter),
            position: 0.0,
            delta,
            start: offsets.start as i64,
            length,
            loop_start,
            loop_end,
            kill_scheduled: false,
            zone,
        }
    }

    /// Produce the next stereo sample.
    ///
    /// `dt` is seconds per output sample and `pitch_wheel` is in semitones.
    pub fn get_sample(&mut self, dt: f32, pitch_wheel: f32, mode: SamplingMode) -> StereoFrame {
        if self.vol_env.is_off() {
            self.kill_scheduled = true;
            return StereoFrame::SILENCE;
        }

        let channel_volume = self.channel.volume();
        let channel_pan = self.channel.pan();
        let channel_pitch = self.channel.pitch() - self.initial_pitch;

        self.vol_env.update(&self.zone.vol_env, dt, true);
        self.mod_env.update(&self.zone.mod_env, dt, false);
        self.vib_lfo.update(&self.zone.vib_lfo, dt);
        self.mod_lfo.update(&self.zone.mod_lfo, dt);

        // ── Pitch ───────────────────────────────────────────
        let octaves = pitch_wheel as f64 / 12.0
            + channel_pitch as f64 / 1200.0
            + (100.0 + self.mod_env.value as f64) * self.zone.mod_env_to_pitch as f64 / 120_000.0
            + self.mod_lfo.value as f64 * self.zone.mod_lfo.to_pitch as f64 / 1200.0
            + self.vib_lfo.value as f64 * self.zone.vib_lfo.to_pitch as f64 / 1200.0;
        self.position += self.delta * octaves.exp2();

        // ── Loop / end of sample ────────────────────────────
        if self.is_looping() {
            let loop_len = (self.loop_end - self.loop_start) as f64;
            if self.position + self.start as f64 > self.loop_end as f64 {
                self.position -= loop_len;
                let absolute = self.position + self.start as f64;
                if absolute > self.loop_end as f64 {
                    // Still past the end after one wrap: the step exceeds the loop.
                    let loop_start = self.loop_start as f64;
                    self.position =
                        loop_start + (absolute - loop_start).rem_euclid(loop_len) - self.start as f64;
                }
            }
        } else if self.position > self.length as f64 {
            self.vol_env.stop();
            return StereoFrame::SILENCE;
        }

        // ── Gain ────────────────────────────────────────────
        let amplitude = ((self.vol_env.value - self.mod_lfo.value * self.zone.mod_lfo.to_volume)
            / 6.0)
            .exp2()
            * (-self.zone.initial_attenuation / 15.0).exp2();
        let base = amplitude * channel_volume;
        let zone_pan = self.zone.pan;
        let mul_l = base * ((1.0 - channel_pan) / 2.0) * ((1.0 - zone_pan) / 2.0);
        let mul_r = base * ((1.0 + channel_pan) / 2.0) * ((1.0 + zone_pan) / 2.0);

        // ── Fetch ───────────────────────────────────────────
        let read_pos = self.position + self.start as f64;
        let index = read_pos.floor() as i64;
        let primary = interpolate(mode, read_pos, index, |i| self.sample_from_index(i, false));
        let stereo = self.sample.sample_type.is_stereo();
        let linked = if stereo {
            interpolate(mode, read_pos, index, |i| self.sample_from_index(i, true))
        } else {
            primary
        };

        let (mut left, mut right) = match self.sample.sample_type {
            SampleType::Left => (primary * mul_l, linked * mul_r),
            SampleType::Right => (linked * mul_l, primary * mul_r),
            // Generic linked samples have no defined pairing; play the primary on both sides.
            SampleType::Mono | SampleType::Linked => (primary * mul_l, primary * mul_r),
        };

        // ── Filter ──────────────────────────────────────────
        let mod_env_cents =
            (100.0 + self.mod_env.value.clamp(-100.0, 0.0)) * self.zone.mod_env_to_filter / 100.0;
        let mod_lfo_cents = self.mod_lfo.value * self.zone.mod_lfo.to_filter;
        self.filter.cutoff =
            self.zone.filter.cutoff * ((mod_env_cents + mod_lfo_cents) / 1200.0).exp2();
        self.filter.update(dt, &mut left, &mut right);

        StereoFrame::new(left, right)
    }

    /// Read one PCM frame as a float. Any index outside the stored data reads
    /// as silence; indices past the loop end wrap into the loop when looping.
    pub fn sample_from_index(&self, index: i64, linked: bool) -> f32 {
        if index < 0 {
            return 0.0;
        }

        let mut index = index;
        if self.is_looping() && index > self.loop_end {
            let loop_len = self.loop_end - self.loop_start;
            index = index.saturating_sub(self.loop_start).rem_euclid(loop_len) + self.loop_start;
        }

        if index < 0 || index >= self.sample.length as i64 {
            return 0.0;
        }

        let data = match (&self.sample.linked, linked) {
            (Some(linked), true) => linked,
            _ => &self.sample.data,
        };
        data.get(index as usize)
            .map(|&pcm| pcm as f32 / PCM_SCALE)
            .unwrap_or(0.0)
    }

    /// Enter the release stage of both envelopes.
    pub fn release(&mut self) {
        self.vol_env.release();
        self.mod_env.release();
    }

    /// Silence immediately and mark for removal.
    pub fn kill(&mut self) {
        self.vol_env.stop();
        self.mod_env.stop();
        self.kill_scheduled = true;
    }

    /// Force the volume envelope off; the oscillator reports finished on its
    /// next sample.
    pub fn stop(&mut self) {
        self.vol_env.stop();
    }

    pub fn kill_scheduled(&self) -> bool {
        self.kill_scheduled
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn volume_envelope(&self) -> &EnvelopeState {
        &self.vol_env
    }

    pub fn modulation_envelope(&self) -> &EnvelopeState {
        &self.mod_env
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn sample_delta(&self) -> f64 {
        self.delta
    }

    fn is_looping(&self) -> bool {
        self.zone.loop_enable && self.loop_end > self.loop_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{EnvelopeParams, LfoParams, SampleOffsets};
    use crate::dsp::envelope::EnvStage;
    use approx::assert_relative_eq;

    const RATE: f32 = 44100.0;
    const DT: f32 = 1.0 / RATE;

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| (i as i16 + 1) * 100).collect()
    }

    /// Hard-left zone and channel so the left gain is exactly 1.
    fn hard_left_zone(loop_enable: bool) -> Zone {
        Zone {
            pan: -1.0,
            loop_enable,
            ..Zone::default()
        }
    }

    fn hard_left_channel() -> Arc<ChannelParams> {
        Arc::new(ChannelParams::new(0.0, 1.0, -1.0))
    }

    fn osc(sample: &Sample, zone: Zone) -> WavetableOscillator {
        WavetableOscillator::new(sample, zone, hard_left_channel(), 60, 100, 1.0)
    }

    #[test]
    fn point_mode_reproduces_pcm() {
        let data = ramp(64);
        let sample = Sample::mono("ramp", data.clone(), RATE);
        let mut o = osc(&sample, hard_left_zone(true));

        // The read head advances before each read, so output n is frame n + 1.
        for n in 0..data.len() - 1 {
            let frame = o.get_sample(DT, 0.0, SamplingMode::Point);
            let expected = data[n + 1] as f32 / PCM_SCALE;
            assert_relative_eq!(frame.left, expected, epsilon = 1e-6);
            assert_eq!(frame.right, 0.0, "hard-left output leaked right at {n}");
        }
    }

    #[test]
    fn looping_keeps_playing() {
        let sample = Sample::mono("ramp", ramp(32), RATE).with_loop(8, 24);
        let mut o = osc(&sample, hard_left_zone(true));
        for _ in 0..10_000 {
            o.get_sample(DT, 0.0, SamplingMode::Linear);
            let pos = o.position();
            assert!(pos <= 24.0, "position escaped the loop: {pos}");
        }
        assert!(!o.volume_envelope().is_off());
        assert!(!o.kill_scheduled());
    }

    #[test]
    fn non_looping_end_turns_off_once() {
        let sample = Sample::mono("short", ramp(16), RATE);
        let mut o = osc(&sample, hard_left_zone(false));

        let mut off_transitions = 0;
        let mut was_off = false;
        for i in 0..64 {
            let frame = o.get_sample(DT, 0.0, SamplingMode::Gaussian);
            let is_off = o.volume_envelope().is_off();
            if is_off && !was_off {
                off_transitions += 1;
            }
            if was_off {
                assert_eq!(frame, StereoFrame::SILENCE, "sound after end at {i}");
                assert!(o.kill_scheduled());
            }
            was_off = is_off;
        }
        assert_eq!(off_transitions, 1);
    }

    #[test]
    fn sample_from_index_never_reads_out_of_bounds() {
        let mut sample = Sample::mono("odd", ramp(10), RATE).with_loop(2, 40);
        // Declared length larger than the data must still read as silence.
        sample.length = 20;
        let zone = Zone {
            loop_enable: true,
            offsets: SampleOffsets {
                loop_end: 5,
                ..SampleOffsets::default()
            },
            ..Zone::default()
        };
        let o = osc(&sample, zone);
        for index in [-1_000_000, -1, 0, 9, 10, 19, 20, 45, 46, 1_000_000, i64::MAX] {
            let value = o.sample_from_index(index, false);
            assert!((-1.0..=1.0).contains(&value), "index {index} read {value}");
            let _ = o.sample_from_index(index, true);
        }
        assert_eq!(o.sample_from_index(-1, false), 0.0);
    }

    #[test]
    fn sample_from_index_wraps_past_loop_end() {
        let sample = Sample::mono("ramp", ramp(32), RATE).with_loop(8, 24);
        let o = osc(&sample, hard_left_zone(true));
        // 25 is one past the loop end: (25 - 8) % 16 + 8 = 9.
        assert_eq!(o.sample_from_index(25, false), o.sample_from_index(9, false));
        assert_eq!(o.sample_from_index(24, false), 2500.0 / PCM_SCALE);
        assert_eq!(o.sample_from_index(40, false), o.sample_from_index(8, false));
    }

    #[test]
    fn non_looping_reads_past_length_as_silence() {
        let sample = Sample::mono("ramp", ramp(8), RATE);
        let o = osc(&sample, hard_left_zone(false));
        assert_eq!(o.sample_from_index(8, false), 0.0);
        assert_eq!(o.sample_from_index(7, false), 800.0 / PCM_SCALE);
    }

    #[test]
    fn stereo_channels_map_to_sides() {
        let left = Sample::stereo("l", vec![1000; 16], vec![-2000; 16], RATE, SampleType::Left);
        let right = Sample::stereo("r", vec![1000; 16], vec![-2000; 16], RATE, SampleType::Right);
        let centre = Arc::new(ChannelParams::new(0.0, 1.0, 0.0));

        let mut o = WavetableOscillator::new(&left, Zone::default(), centre.clone(), 60, 100, 1.0);
        let frame = o.get_sample(DT, 0.0, SamplingMode::Point);
        assert!(frame.left > 0.0 && frame.right < 0.0, "left sample: {frame:?}");

        let mut o = WavetableOscillator::new(&right, Zone::default(), centre, 60, 100, 1.0);
        let frame = o.get_sample(DT, 0.0, SamplingMode::Point);
        assert!(frame.left < 0.0 && frame.right > 0.0, "right sample: {frame:?}");
    }

    #[test]
    fn linked_type_duplicates_primary() {
        let mut sample = Sample::mono("linked", vec![1000; 16], RATE);
        sample.sample_type = SampleType::Linked;
        let centre = Arc::new(ChannelParams::new(0.0, 1.0, 0.0));
        let mut o = WavetableOscillator::new(&sample, Zone::default(), centre, 60, 100, 1.0);
        let frame = o.get_sample(DT, 0.0, SamplingMode::Linear);
        assert!(frame.left > 0.0);
        assert_eq!(frame.left, frame.right);
    }

    #[test]
    fn centre_pan_splits_a_quarter_each() {
        let sample = Sample::mono("dc", vec![i16::MAX; 16], RATE);
        let centre = Arc::new(ChannelParams::new(0.0, 1.0, 0.0));
        let mut o = WavetableOscillator::new(&sample, Zone::default(), centre, 60, 100, 1.0);
        let frame = o.get_sample(DT, 0.0, SamplingMode::Point);
        assert_relative_eq!(frame.left, 0.25, epsilon = 1e-6);
        assert_relative_eq!(frame.right, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn attenuation_uses_fifteen_per_halving() {
        let sample = Sample::mono("dc", vec![i16::MAX; 16], RATE);
        let zone = Zone {
            initial_attenuation: 15.0,
            ..hard_left_zone(true)
        };
        let mut o = osc(&sample, zone);
        let frame = o.get_sample(DT, 0.0, SamplingMode::Point);
        assert_relative_eq!(frame.left, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn channel_volume_is_live() {
        let sample = Sample::mono("dc", vec![i16::MAX; 64], RATE);
        let channel = hard_left_channel();
        let mut o = WavetableOscillator::new(&sample, hard_left_zone(true), channel.clone(), 60, 100, 1.0);
        let before = o.get_sample(DT, 0.0, SamplingMode::Point);
        channel.set_volume(0.5);
        let after = o.get_sample(DT, 0.0, SamplingMode::Point);
        assert_relative_eq!(after.left, before.left * 0.5, epsilon = 1e-6);
    }

    #[test]
    fn pitch_wheel_and_channel_pitch_bend_the_step() {
        let sample = Sample::mono("ramp", ramp(64), RATE);
        let channel = hard_left_channel();
        let mut o = WavetableOscillator::new(&sample, hard_left_zone(true), channel.clone(), 60, 100, 1.0);
        o.get_sample(DT, 12.0, SamplingMode::Point);
        assert_relative_eq!(o.position(), 2.0, epsilon = 1e-9);

        channel.set_pitch(-1200.0);
        o.get_sample(DT, 0.0, SamplingMode::Point);
        assert_relative_eq!(o.position(), 2.5, epsilon = 1e-6);
    }

    #[test]
    fn start_offset_shifts_the_read_head() {
        let data = ramp(32);
        let sample = Sample::mono("ramp", data.clone(), RATE);
        let zone = Zone {
            offsets: SampleOffsets {
                start: 4,
                ..SampleOffsets::default()
            },
            ..hard_left_zone(false)
        };
        let mut o = osc(&sample, zone);
        let frame = o.get_sample(DT, 0.0, SamplingMode::Point);
        assert_relative_eq!(frame.left, data[5] as f32 / PCM_SCALE, epsilon = 1e-6);
    }

    #[test]
    fn release_moves_both_envelopes_to_release() {
        let sample = Sample::mono("dc", vec![1000; 64], RATE);
        let zone = Zone {
            vol_env: EnvelopeParams::from_seconds(0.0, 0.0, 0.0, 0.0, 0.0, 0.5),
            mod_env: EnvelopeParams::from_seconds(0.0, 0.0, 0.0, 0.0, 0.5, 0.5),
            ..hard_left_zone(true)
        };
        let mut o = osc(&sample, zone);
        o.get_sample(DT, 0.0, SamplingMode::Point);
        o.release();
        assert_eq!(o.volume_envelope().stage, EnvStage::Release);
        assert_eq!(o.modulation_envelope().stage, EnvStage::Release);
        assert!(!o.kill_scheduled());
    }

    #[test]
    fn kill_is_immediate() {
        let sample = Sample::mono("dc", vec![1000; 64], RATE);
        let mut o = osc(&sample, hard_left_zone(true));
        o.get_sample(DT, 0.0, SamplingMode::Point);
        o.kill();
        assert!(o.kill_scheduled());
        assert_eq!(o.get_sample(DT, 0.0, SamplingMode::Point), StereoFrame::SILENCE);
    }

    #[test]
    fn closed_filter_darkens_output() {
        let data: Vec<i16> = (0..64).map(|i| if i % 2 == 0 { 20000 } else { -20000 }).collect();
        let sample = Sample::mono("nyquist", data, RATE);
        let mut zone = hard_left_zone(true);
        let mut open = osc(&sample, zone.clone());
        zone.filter.cutoff = 200.0;
        let mut closed = osc(&sample, zone);

        let (mut open_peak, mut closed_peak) = (0.0_f32, 0.0_f32);
        for _ in 0..63 {
            open_peak = open_peak.max(open.get_sample(DT, 0.0, SamplingMode::Point).left.abs());
            closed_peak =
                closed_peak.max(closed.get_sample(DT, 0.0, SamplingMode::Point).left.abs());
        }
        assert!(
            closed_peak < open_peak * 0.1,
            "closed {closed_peak} should be far below open {open_peak}"
        );
    }

    // ── Modulation routing ──────────────────────────────────

    /// One tick this long puts a 2 Hz LFO exactly on its positive peak.
    const LFO_PEAK_DT: f32 = 0.125;

    fn peak_lfo(to_pitch: f32, to_filter: f32, to_volume: f32) -> LfoParams {
        LfoParams {
            rate: 2.0,
            delay: 0.0,
            to_pitch,
            to_filter,
            to_volume,
        }
    }

    /// Modulation envelope that sits at its peak for a second.
    fn held_mod_env() -> EnvelopeParams {
        EnvelopeParams::from_seconds(0.0, 0.0, 1.0, 0.0, 0.0, 0.0)
    }

    #[test]
    fn mod_envelope_bends_pitch() {
        let sample = Sample::mono("ramp", ramp(64), RATE);
        let zone = Zone {
            mod_env: held_mod_env(),
            mod_env_to_pitch: 1200.0,
            ..hard_left_zone(false)
        };
        let mut o = osc(&sample, zone);
        o.get_sample(DT, 0.0, SamplingMode::Point);
        assert_eq!(o.modulation_envelope().value, 0.0);
        assert_relative_eq!(o.position(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn vibrato_lfo_bends_pitch() {
        let sample = Sample::mono("ramp", ramp(64), RATE);
        let zone = Zone {
            vib_lfo: peak_lfo(1200.0, 0.0, 0.0),
            ..hard_left_zone(false)
        };
        let mut o = osc(&sample, zone);
        o.get_sample(LFO_PEAK_DT, 0.0, SamplingMode::Point);
        assert_relative_eq!(o.position(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn mod_lfo_bends_pitch() {
        let sample = Sample::mono("ramp", ramp(64), RATE);
        let zone = Zone {
            mod_lfo: peak_lfo(-1200.0, 0.0, 0.0),
            ..hard_left_zone(false)
        };
        let mut o = osc(&sample, zone);
        o.get_sample(LFO_PEAK_DT, 0.0, SamplingMode::Point);
        assert_relative_eq!(o.position(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn mod_lfo_scales_volume() {
        let sample = Sample::mono("dc", vec![i16::MAX; 16], RATE);
        let zone = Zone {
            mod_lfo: peak_lfo(0.0, 0.0, 6.0),
            ..hard_left_zone(false)
        };
        let mut o = osc(&sample, zone);
        let frame = o.get_sample(LFO_PEAK_DT, 0.0, SamplingMode::Point);
        assert_relative_eq!(frame.left, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn mod_envelope_moves_cutoff() {
        let sample = Sample::mono("ramp", ramp(64), RATE);
        let mut zone = Zone {
            mod_env: held_mod_env(),
            mod_env_to_filter: 1200.0,
            ..hard_left_zone(false)
        };
        zone.filter.cutoff = 1000.0;
        let mut o = osc(&sample, zone);
        o.get_sample(DT, 0.0, SamplingMode::Point);
        assert_relative_eq!(o.filter.cutoff, 2000.0, epsilon = 1e-2);
    }

    #[test]
    fn mod_lfo_moves_cutoff() {
        let sample = Sample::mono("ramp", ramp(64), RATE);
        let mut zone = Zone {
            mod_lfo: peak_lfo(0.0, -1200.0, 0.0),
            ..hard_left_zone(false)
        };
        zone.filter.cutoff = 1000.0;
        let mut o = osc(&sample, zone);
        o.get_sample(LFO_PEAK_DT, 0.0, SamplingMode::Point);
        assert_relative_eq!(o.filter.cutoff, 500.0, epsilon = 1e-2);
    }

    #[test]
    fn mod_envelope_closing_the_filter_darkens_output() {
        let data: Vec<i16> = (0..64).map(|i| if i % 2 == 0 { 20000 } else { -20000 }).collect();
        let sample = Sample::mono("nyquist", data, RATE);
        let mut zone = hard_left_zone(true);
        zone.filter.cutoff = 8000.0;
        let mut plain = osc(&sample, zone.clone());
        zone.mod_env = held_mod_env();
        zone.mod_env_to_filter = -4800.0;
        let mut swept = osc(&sample, zone);

        let (mut plain_peak, mut swept_peak) = (0.0_f32, 0.0_f32);
        for _ in 0..63 {
            plain_peak = plain_peak.max(plain.get_sample(DT, 0.0, SamplingMode::Point).left.abs());
            swept_peak = swept_peak.max(swept.get_sample(DT, 0.0, SamplingMode::Point).left.abs());
        }
        assert!(
            swept_peak < plain_peak * 0.5,
            "swept {swept_peak} should be below plain {plain_peak}"
        );
    }
}
