//! Deterministic synthetic flicker waveforms.
//!
//! Both generators oscillate around 1.0 with an amplitude chosen so that
//! `v_pp / v_max × 100` equals the requested percent flicker.

use std::f64::consts::PI;

/// Modulation amplitude giving `percent_flicker` around a mean of 1.0.
///
/// With `v_max = 1 + a` and `v_min = 1 - a`, percent flicker is
/// `200a / (1 + a)`, so `a = p / (200 - p)`.
fn amplitude(percent_flicker: f64) -> f64 {
    let p = percent_flicker.clamp(0.0, 100.0);
    p / (200.0 - p)
}

fn sample_times(duration: f64, sample_rate: f64) -> impl Iterator<Item = f64> {
    let n = if sample_rate > 0.0 && duration > 0.0 {
        (duration * sample_rate).round() as usize
    } else {
        0
    };
    (0..n).map(move |i| i as f64 / sample_rate)
}

/// Sinusoidal flicker, `1 + a·sin(2πft)`.
///
/// # Arguments
/// * `frequency` - Flicker frequency in Hz
/// * `duration` - Record length in seconds
/// * `sample_rate` - Samples per second
/// * `percent_flicker` - Target percent flicker, clamped to 0-100
pub fn sine_flicker(frequency: f64, duration: f64, sample_rate: f64, percent_flicker: f64) -> Vec<(f64, f64)> {
    let a = amplitude(percent_flicker);
    sample_times(duration, sample_rate)
        .map(|t| (t, 1.0 + a * (2.0 * PI * frequency * t).sin()))
        .collect()
}

/// Square-wave flicker with a 50% duty cycle, high for the first half period.
pub fn square_flicker(frequency: f64, duration: f64, sample_rate: f64, percent_flicker: f64) -> Vec<(f64, f64)> {
    let a = amplitude(percent_flicker);
    sample_times(duration, sample_rate)
        .map(|t| {
            let phase = (frequency * t).fract();
            let level = if phase < 0.5 { 1.0 + a } else { 1.0 - a };
            (t, level)
        })
        .collect()
}
