//! Six-stage envelope generator.
//!
//! Values live in a dB-like domain: [`PEAK`] (0) is full level and [`FLOOR`]
//! (-100) is silence. Volume amplitude is `2^(value / 6)`.

use crate::bank::EnvelopeParams;

/// Envelope value at full level.
pub const PEAK: f32 = 0.0;
/// Envelope value at silence.
pub const FLOOR: f32 = -100.0;

const RANGE: f32 = PEAK - FLOOR;

/// Envelope stages, in playing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvStage {
    #[default]
    Off,
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
}

/// Runtime state of one envelope.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeState {
    pub stage: EnvStage,
    pub value: f32,
    /// Seconds spent in the current stage.
    pub time: f32,
    /// Value the release stage started from.
    release_from: f32,
}

impl EnvelopeState {
    /// A fresh envelope sitting at the start of its delay stage.
    pub fn triggered() -> Self {
        EnvelopeState {
            stage: EnvStage::Delay,
            value: FLOOR,
            time: 0.0,
            release_from: FLOOR,
        }
    }

    /// Advance by `dt` seconds.
    ///
    /// `is_volume` selects how sustain and attack are interpreted: volume
    /// envelopes treat sustain as dB of attenuation and attack as linear
    /// amplitude; modulation envelopes treat sustain as a fractional decrease
    /// and attack as linear in value.
    pub fn update(&mut self, params: &EnvelopeParams, dt: f32, is_volume: bool) {
        self.time += dt;

        // Every pass either returns or moves one stage forward, so this ends.
        loop {
            match self.stage {
                EnvStage::Off => {
                    self.value = FLOOR;
                    return;
                }
                EnvStage::Delay => {
                    self.value = FLOOR;
                    if !self.finish_timed(params.delay, EnvStage::Attack) {
                        return;
                    }
                }
                EnvStage::Attack => {
                    if self.finish_timed(params.attack, EnvStage::Hold) {
                        self.value = PEAK;
                        continue;
                    }
                    let progress = (self.time * params.attack).clamp(0.0, 1.0);
                    self.value = if is_volume {
                        (6.0 * progress.log2()).max(FLOOR)
                    } else {
                        FLOOR + RANGE * progress
                    };
                    return;
                }
                EnvStage::Hold => {
                    self.value = PEAK;
                    if !self.finish_timed(params.hold, EnvStage::Decay) {
                        return;
                    }
                }
                EnvStage::Decay => {
                    let target = sustain_level(params, is_volume);
                    let rate = params.decay;
                    if rate <= 0.0 || !rate.is_finite() {
                        self.enter(EnvStage::Sustain, 0.0);
                        continue;
                    }
                    let needed = (PEAK - target) / rate;
                    if self.time >= needed {
                        let overshoot = self.time - needed;
                        self.enter(EnvStage::Sustain, overshoot);
                        continue;
                    }
                    self.value = PEAK - rate * self.time;
                    return;
                }
                EnvStage::Sustain => {
                    self.value = sustain_level(params, is_volume);
                    return;
                }
                EnvStage::Release => {
                    let rate = params.release;
                    if rate <= 0.0 || !rate.is_finite() {
                        self.enter(EnvStage::Off, 0.0);
                        continue;
                    }
                    self.value = self.release_from - rate * self.time;
                    if self.value <= FLOOR {
                        self.enter(EnvStage::Off, 0.0);
                        continue;
                    }
                    return;
                }
            }
        }
    }

    /// Jump to the release stage from wherever the envelope is. No-op when off.
    pub fn release(&mut self) {
        if matches!(self.stage, EnvStage::Off | EnvStage::Release) {
            return;
        }
        self.release_from = self.value;
        self.stage = EnvStage::Release;
        self.time = 0.0;
    }

    /// Silence immediately.
    pub fn stop(&mut self) {
        self.stage = EnvStage::Off;
        self.value = FLOOR;
        self.time = 0.0;
    }

    pub fn is_off(&self) -> bool {
        self.stage == EnvStage::Off
    }

    /// If the timed stage with `rate` has run its course, move to `next`
    /// keeping the overshoot and return true.
    fn finish_timed(&mut self, rate: f32, next: EnvStage) -> bool {
        if rate <= 0.0 || !rate.is_finite() {
            let carried = self.time;
            self.enter(next, carried);
            return true;
        }
        let duration = 1.0 / rate;
        if self.time >= duration {
            let overshoot = self.time - duration;
            self.enter(next, overshoot);
            return true;
        }
        false
    }

    fn enter(&mut self, stage: EnvStage, time: f32) {
        self.stage = stage;
        self.time = time;
    }
}

/// Envelope value held during sustain.
pub fn sustain_level(params: &EnvelopeParams, is_volume: bool) -> f32 {
    if is_volume {
        (-params.sustain).clamp(FLOOR, PEAK)
    } else {
        PEAK - RANGE * params.sustain.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 1000.0;

    fn run(env: &mut EnvelopeState, params: &EnvelopeParams, steps: usize, is_volume: bool) {
        for _ in 0..steps {
            env.update(params, DT, is_volume);
        }
    }

    #[test]
    fn default_state_is_off() {
        let mut env = EnvelopeState::default();
        assert!(env.is_off());
        env.update(&EnvelopeParams::default(), DT, true);
        assert!(env.is_off());
        assert_eq!(env.value, FLOOR);
    }

    #[test]
    fn walks_through_every_stage() {
        // 10 ms delay, 10 ms attack, 10 ms hold, decay 100 units in 100 ms.
        let params = EnvelopeParams::from_seconds(0.01, 0.01, 0.01, 0.1, 20.0, 0.1);
        let mut env = EnvelopeState::triggered();

        run(&mut env, &params, 5, true);
        assert_eq!(env.stage, EnvStage::Delay);
        assert_eq!(env.value, FLOOR);

        run(&mut env, &params, 10, true);
        assert_eq!(env.stage, EnvStage::Attack);
        assert!(env.value > FLOOR && env.value < PEAK, "attack value {}", env.value);

        run(&mut env, &params, 10, true);
        assert_eq!(env.stage, EnvStage::Hold);
        assert_eq!(env.value, PEAK);

        run(&mut env, &params, 15, true);
        assert_eq!(env.stage, EnvStage::Decay);
        assert!(env.value < PEAK && env.value > -20.0, "decay value {}", env.value);

        run(&mut env, &params, 100, true);
        assert_eq!(env.stage, EnvStage::Sustain);
        assert_eq!(env.value, -20.0);

        // Sustain has no timed exit.
        run(&mut env, &params, 10_000, true);
        assert_eq!(env.stage, EnvStage::Sustain);
    }

    #[test]
    fn volume_attack_is_linear_in_amplitude() {
        let params = EnvelopeParams::from_seconds(0.0, 1.0, 0.0, 0.0, 0.0, 0.0);
        let mut env = EnvelopeState::triggered();
        run(&mut env, &params, 500, true);
        let amplitude = 2.0_f32.powf(env.value / 6.0);
        assert!((amplitude - 0.5).abs() < 0.01, "amplitude at half attack {amplitude}");
    }

    #[test]
    fn modulation_attack_is_linear_in_value() {
        let params = EnvelopeParams::from_seconds(0.0, 1.0, 0.0, 0.0, 0.0, 0.0);
        let mut env = EnvelopeState::triggered();
        run(&mut env, &params, 500, false);
        assert!((env.value + 50.0).abs() < 0.5, "value at half attack {}", env.value);
    }

    #[test]
    fn modulation_sustain_is_fractional() {
        let params = EnvelopeParams {
            sustain: 0.25,
            ..EnvelopeParams::default()
        };
        let mut env = EnvelopeState::triggered();
        env.update(&params, DT, false);
        assert_eq!(env.stage, EnvStage::Sustain);
        assert_eq!(env.value, -25.0);
    }

    #[test]
    fn zero_rates_skip_straight_to_sustain() {
        let params = EnvelopeParams::default();
        let mut env = EnvelopeState::triggered();
        env.update(&params, DT, true);
        assert_eq!(env.stage, EnvStage::Sustain);
        assert_eq!(env.value, PEAK);
    }

    #[test]
    fn overshoot_carries_into_next_stage() {
        // 1 ms delay then a 10 ms attack; a single 3 ms tick lands 2 ms into attack.
        let params = EnvelopeParams::from_seconds(0.001, 0.01, 0.0, 0.0, 0.0, 0.0);
        let mut env = EnvelopeState::triggered();
        env.update(&params, 0.003, false);
        assert_eq!(env.stage, EnvStage::Attack);
        assert!((env.time - 0.002).abs() < 1e-6, "time in attack {}", env.time);
        assert!((env.value - (FLOOR + RANGE * 0.2)).abs() < 0.01);
    }

    #[test]
    fn release_from_any_active_stage_reaches_off() {
        let params = EnvelopeParams::from_seconds(0.0, 0.5, 0.0, 0.0, 0.0, 0.05);
        let mut env = EnvelopeState::triggered();
        run(&mut env, &params, 100, true);
        assert_eq!(env.stage, EnvStage::Attack);
        let before = env.value;

        env.release();
        assert_eq!(env.stage, EnvStage::Release);
        env.update(&params, DT, true);
        assert!(env.value < before);

        run(&mut env, &params, 100, true);
        assert!(env.is_off());
        assert_eq!(env.value, FLOOR);
    }

    #[test]
    fn release_on_off_is_noop() {
        let mut env = EnvelopeState::default();
        env.release();
        assert!(env.is_off());
    }

    #[test]
    fn release_is_idempotent() {
        let params = EnvelopeParams::from_seconds(0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let mut env = EnvelopeState::triggered();
        run(&mut env, &params, 10, true);
        env.release();
        run(&mut env, &params, 100, true);
        let time = env.time;
        env.release();
        assert_eq!(env.time, time, "second release must not restart the stage");
    }

    #[test]
    fn values_stay_in_range() {
        let params = EnvelopeParams::from_seconds(0.01, 0.02, 0.01, 0.3, 60.0, 0.2);
        let mut env = EnvelopeState::triggered();
        for i in 0..2000 {
            if i == 1000 {
                env.release();
            }
            env.update(&params, DT, true);
            assert!(
                env.value >= FLOOR && env.value <= PEAK,
                "envelope out of range at step {i}: {}",
                env.value
            );
        }
        assert!(env.is_off());
    }
}
