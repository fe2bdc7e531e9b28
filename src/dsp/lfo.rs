//! Triangle LFO with a start delay.

use crate::bank::LfoParams;

/// Runtime state of one LFO.
///
/// Output is 0 until the delay has elapsed, then a triangle in [-1, 1]
/// starting at 0 and rising.
#[derive(Debug, Clone, Copy, Default)]
pub struct LfoState {
    /// Seconds since trigger, saturating at the delay.
    pub time: f32,
    /// Cycle position in [0, 1).
    pub phase: f32,
    pub value: f32,
}

impl LfoState {
    pub fn update(&mut self, params: &LfoParams, dt: f32) {
        let mut dt = dt;
        if self.time < params.delay {
            self.time += dt;
            if self.time < params.delay {
                self.value = 0.0;
                return;
            }
            // Only the part of the tick past the delay moves the phase.
            dt = self.time - params.delay;
            self.time = params.delay;
        }

        if params.rate > 0.0 && params.rate.is_finite() {
            self.phase = (self.phase + params.rate * dt).fract();
        }
        self.value = triangle(self.phase);
    }
}

fn triangle(phase: f32) -> f32 {
    if phase < 0.25 {
        4.0 * phase
    } else if phase < 0.75 {
        2.0 - 4.0 * phase
    } else {
        4.0 * phase - 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_neutral_during_delay() {
        let params = LfoParams {
            rate: 5.0,
            delay: 0.1,
            ..LfoParams::default()
        };
        let mut lfo = LfoState::default();
        for _ in 0..99 {
            lfo.update(&params, 0.001);
            assert_eq!(lfo.value, 0.0);
        }
    }

    #[test]
    fn triangle_hits_both_extremes() {
        let params = LfoParams {
            rate: 1.0,
            ..LfoParams::default()
        };
        let mut lfo = LfoState::default();
        let (mut min, mut max) = (0.0_f32, 0.0_f32);
        for _ in 0..1000 {
            lfo.update(&params, 0.001);
            assert!(lfo.value >= -1.0 && lfo.value <= 1.0, "out of range: {}", lfo.value);
            min = min.min(lfo.value);
            max = max.max(lfo.value);
        }
        assert!(max > 0.99, "max {max}");
        assert!(min < -0.99, "min {min}");
    }

    #[test]
    fn quarter_cycle_reaches_peak() {
        let params = LfoParams {
            rate: 2.0,
            ..LfoParams::default()
        };
        let mut lfo = LfoState::default();
        lfo.update(&params, 0.125);
        assert!((lfo.value - 1.0).abs() < 1e-5, "value {}", lfo.value);
    }

    #[test]
    fn zero_rate_stays_neutral() {
        let mut lfo = LfoState::default();
        for _ in 0..100 {
            lfo.update(&LfoParams::default(), 0.01);
        }
        assert_eq!(lfo.value, 0.0);
    }
}
