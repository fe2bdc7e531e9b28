//! One-pole low-pass filter with a per-sample cutoff.

use std::f32::consts::PI;

use crate::bank::FilterParams;

/// Cutoffs at or above this are treated as a fully open filter.
pub const FILTER_OPEN_HZ: f32 = 19_900.0;

/// Stereo one-pole low-pass.
///
/// `y[n] = y[n-1] + alpha * (x[n] - y[n-1])` with
/// `alpha = 1 - exp(-2π · fc · dt)`.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    /// Cutoff in Hz, rewritten by the oscillator every sample.
    pub cutoff: f32,
    /// Carried from the zone. The one-pole response has no resonance.
    pub resonance: f32,
    /// Last output per channel (left, right).
    history: [f32; 2],
}

impl LowPassFilter {
    pub fn from_params(params: &FilterParams) -> Self {
        LowPassFilter {
            cutoff: params.cutoff,
            resonance: params.resonance,
            history: [0.0; 2],
        }
    }

    /// Filter one stereo pair in place. `dt` is seconds per sample.
    pub fn update(&mut self, dt: f32, left: &mut f32, right: &mut f32) {
        let nyquist = 0.5 / dt;
        if !(self.cutoff < FILTER_OPEN_HZ && self.cutoff < nyquist) {
            // Bypassed: keep history on the signal so re-engaging does not click.
            self.history = [*left, *right];
            return;
        }

        let cutoff = self.cutoff.max(0.0);
        let alpha = 1.0 - (-2.0 * PI * cutoff * dt).exp();
        for (channel, sample) in [left, right].into_iter().enumerate() {
            let y = self.history[channel] + alpha * (*sample - self.history[channel]);
            self.history[channel] = y;
            *sample = y;
        }
    }

    pub fn reset(&mut self) {
        self.history = [0.0; 2];
    }
}
