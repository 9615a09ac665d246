//! # Flicker Metrics Module
//!
//! Amplitude metrics computed on the original (unprocessed) samples.
//!
//! ## Metrics
//! - Percent flicker: `v_pp / v_max × 100`
//! - Flicker index: area above the midrange over the total area of one period
//! - RMS variation: RMS deviation from the sample mean, as a percentage of it

use crate::preprocess;
use crate::stats;

/// Percent flicker, `v_pp / v_max × 100`.
///
/// The denominator is the peak value, not the average. Returns 0.0 when
/// `v_max` is 0.
pub fn percent_flicker(v_pp: f64, v_max: f64) -> f64 {
    if v_max == 0.0 {
        return 0.0;
    }
    v_pp / v_max * 100.0
}

/// Composite Simpson's rule with unit sample spacing.
///
/// For an even number of samples (odd number of intervals) the result is the
/// average of two estimates: Simpson over the first `n - 1` samples plus a
/// trapezoid on the last interval, and a trapezoid on the first interval plus
/// Simpson over the rest.
pub fn simpson(y: &[f64]) -> f64 {
    let n = y.len();
    match n {
        0 | 1 => 0.0,
        2 => 0.5 * (y[0] + y[1]),
        _ if n % 2 == 1 => simpson_odd(y),
        _ => {
            let first = simpson_odd(&y[..n - 1]) + 0.5 * (y[n - 2] + y[n - 1]);
            let last = 0.5 * (y[0] + y[1]) + simpson_odd(&y[1..]);
            0.5 * (first + last)
        }
    }
}

/// Simpson's rule over an odd number of samples (an even number of intervals).
fn simpson_odd(y: &[f64]) -> f64 {
    let n = y.len();
    if n < 3 {
        return if n == 2 { 0.5 * (y[0] + y[1]) } else { 0.0 };
    }
    let interior: f64 = y[1..n - 1]
        .iter()
        .enumerate()
        .map(|(i, v)| if i % 2 == 0 { 4.0 * v } else { 2.0 * v })
        .sum();
    (y[0] + interior + y[n - 1]) / 3.0
}

/// Flicker index of one period of samples.
///
/// The part of the curve above `v_avg` is integrated against the whole curve.
/// Returns 0.0 when the total area is not positive.
///
/// # Arguments
/// * `one_period` - Sample values covering exactly one period
/// * `v_avg` - Midrange of the full waveform
pub fn flicker_index(one_period: &[f64], v_avg: f64) -> f64 {
    let curve_top: Vec<f64> = one_period.iter().map(|&v| v.max(v_avg) - v_avg).collect();
    let area_top = simpson(&curve_top);
    let area_all = simpson(one_period);
    if !(area_all > 0.0) {
        return 0.0;
    }
    area_top / area_all
}

/// RMS deviation from the sample mean as a percentage of the mean.
///
/// Returns 0.0 for an empty record or a zero mean.
pub fn rms_variation(values: &[f64]) -> f64 {
    let Some(mean) = stats::mean(values) else {
        return 0.0;
    };
    if mean == 0.0 {
        return 0.0;
    }
    let deviations = preprocess::center(values);
    let rms = (deviations.iter().map(|d| d * d).sum::<f64>() / deviations.len() as f64).sqrt();
    rms / mean * 100.0
}
