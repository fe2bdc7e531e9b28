//! Sample interpolation kernels.
//!
//! Each kernel reads taps through a `fetch` closure so the caller decides how
//! out-of-range and looped indices resolve.

use std::f32::consts::E;
use std::sync::LazyLock;

use crate::config::SamplingMode;

/// Entries in the bell-curve table; one unit of distance spans 256 entries.
pub const BELL_CURVE_LEN: usize = 512;

/// 4-tap Gaussian weights, built once on first use.
///
/// The constants are tuned so Gaussian playback is about as loud as point
/// and linear playback. They are not a normalized Gaussian.
static BELL_CURVE: LazyLock<[f32; BELL_CURVE_LEN]> = LazyLock::new(|| {
    let mut table = [0.0; BELL_CURVE_LEN];
    for (ix, weight) in table.iter_mut().enumerate() {
        let x_270 = ix as f32 / 270.0;
        let x_512 = ix as f32 / 512.0;
        let result = E.powf(-x_270 * x_270) * 1305.0 * (1.0 - x_512 * x_512).powf(1.4);
        *weight = result / 2039.0;
    }
    table
});

pub fn bell_curve() -> &'static [f32; BELL_CURVE_LEN] {
    &BELL_CURVE
}

/// Weight for a tap `distance` samples away from the read position.
pub fn bell_weight(distance: f64) -> f32 {
    let ix = (distance.abs() * 256.0).round() as usize % BELL_CURVE_LEN;
    BELL_CURVE[ix]
}

/// Interpolate the signal at `position`.
///
/// `index` is the integer tap the position maps to in the sample array
/// (it already includes any start offset); `position` is the fractional
/// read position on the same axis.
pub fn interpolate(
    mode: SamplingMode,
    position: f64,
    index: i64,
    fetch: impl Fn(i64) -> f32,
) -> f32 {
    match mode {
        SamplingMode::Point => fetch(index),
        SamplingMode::Linear => {
            let t = position.fract() as f32;
            let a = fetch(index);
            let b = fetch(index + 1);
            a + (b - a) * t
        }
        SamplingMode::Gaussian => {
            let mut acc = 0.0;
            for offset in -1..3 {
                let tap = index + offset;
                acc += fetch(tap) * bell_weight(position - tap as f64);
            }
            acc
        }
    }
}
