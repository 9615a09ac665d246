//! # Display Spectrum Module
//!
//! Normalized magnitude spectrum of a whole record for plotting and
//! diagnostics. Nothing here feeds the reported metrics; the authoritative
//! frequency comes from [`crate::frequency`].

use serde::Serialize;
use tracing::debug;

use crate::fft;
use crate::preprocess;
use crate::stats;

/// Positive-frequency magnitude spectrum, normalized to the strongest bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumReport {
    /// Bin frequencies in Hz, ascending
    pub frequencies: Vec<f64>,
    /// Magnitudes in `[0, 1]`, one per frequency
    pub magnitudes: Vec<f64>,
    /// Frequency of the strongest positive bin, 0.0 for a flat record
    pub dominant_frequency: f64,
}

/// Computes the display spectrum of `values`.
///
/// DC is removed and no window is applied. The dominant frequency is taken
/// over every positive bin before the output is cut at `max_frequency`.
///
/// # Arguments
/// * `values` - Sample values
/// * `sample_rate` - Sample rate in Hz
/// * `max_frequency` - Highest frequency kept in the report
pub fn compute(values: &[f64], sample_rate: f64, max_frequency: f64) -> SpectrumReport {
    let n = values.len();
    let signal = preprocess::center(values);

    let spectrum = fft::forward(&signal, n);
    let positive = 1..=(n.saturating_sub(1) / 2);
    let raw: Vec<(f64, f64)> = positive
        .map(|k| (fft::bin_frequency(k as f64, n, sample_rate), spectrum[k].norm()))
        .collect();

    let peak = raw.iter().map(|&(_, m)| m).fold(0.0, f64::max);
    let magnitudes_all: Vec<f64> = raw.iter().map(|&(_, m)| m).collect();
    let dominant_frequency = if peak > 0.0 {
        stats::argmax(&magnitudes_all).map_or(0.0, |i| raw[i].0)
    } else {
        0.0
    };

    let (frequencies, magnitudes): (Vec<f64>, Vec<f64>) = raw
        .into_iter()
        .filter(|&(f, _)| f <= max_frequency)
        .map(|(f, m)| (f, if peak > 0.0 { m / peak } else { 0.0 }))
        .unzip();

    debug!(
        "[SPECTRUM] {} bins up to {} Hz, dominant {:.3} Hz",
        frequencies.len(),
        max_frequency,
        dominant_frequency
    );

    SpectrumReport {
        frequencies,
        magnitudes,
        dominant_frequency,
    }
}
