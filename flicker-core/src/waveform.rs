//! # Waveform Module
//!
//! This module holds the captured light-output (or voltage) record that every
//! analysis step consumes. A [`Waveform`] is an immutable value: the derived
//! scalars are computed once at construction and denoising returns a new
//! instance instead of mutating the samples in place.
//!
//! ## Derived values
//! - Sample rate from the median sample interval
//! - `v_max`, `v_min`, peak-to-peak and the midrange average

use tracing::debug;

use crate::error::{FlickerError, FlickerResult};
use crate::preprocess;
use crate::stats;

/// Smallest record the analysis accepts.
///
/// Fewer samples cannot hold even a couple of cycles of the slowest flicker
/// the estimators look for.
pub const MIN_SAMPLES: usize = 10;

/// Polynomial order used by [`Waveform::denoise`].
const DENOISE_POLY_ORDER: usize = 2;
const MIN_DENOISE_WINDOW: usize = 3;

/// A sampled waveform with its derived amplitude scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    times: Vec<f64>,
    values: Vec<f64>,
    sample_rate: u32,
    v_max: f64,
    v_min: f64,
}

impl Waveform {
    /// Builds a waveform from `(time, value)` pairs.
    ///
    /// Rows with a non-finite time or value, and rows whose time does not
    /// strictly increase over the previously kept row, are dropped before the
    /// derived values are computed.
    ///
    /// # Errors
    /// * `InvalidWaveform` if fewer than two usable samples remain, if the
    ///   median sample interval is degenerate, or if fewer than
    ///   [`MIN_SAMPLES`] remain
    pub fn new(samples: &[(f64, f64)]) -> FlickerResult<Self> {
        let mut times = Vec::with_capacity(samples.len());
        let mut values = Vec::with_capacity(samples.len());

        for &(t, v) in samples {
            if !t.is_finite() || !v.is_finite() {
                continue;
            }
            if let Some(&last) = times.last() {
                if t <= last {
                    continue;
                }
            }
            times.push(t);
            values.push(v);
        }

        let dropped = samples.len() - times.len();
        if dropped > 0 {
            debug!("[WAVEFORM] Dropped {} unusable rows of {}", dropped, samples.len());
        }

        if times.len() < 2 {
            return Err(FlickerError::InvalidWaveform(format!(
                "fewer than 2 usable samples (got {})",
                times.len()
            )));
        }

        let intervals: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
        let median_dt = stats::median(&intervals).unwrap_or(0.0);
        if !median_dt.is_finite() || median_dt <= 0.0 {
            return Err(FlickerError::InvalidWaveform(format!(
                "degenerate sample interval {median_dt}"
            )));
        }

        let rate = (1.0 / median_dt).round();
        if !rate.is_finite() || rate < 1.0 || rate > u32::MAX as f64 {
            return Err(FlickerError::InvalidWaveform(format!(
                "sample interval {median_dt} s gives no usable sample rate"
            )));
        }

        if times.len() < MIN_SAMPLES {
            return Err(FlickerError::InvalidWaveform(format!(
                "need at least {} samples, got {}",
                MIN_SAMPLES,
                times.len()
            )));
        }

        let v_max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let v_min = values.iter().cloned().fold(f64::INFINITY, f64::min);

        Ok(Self {
            times,
            values,
            sample_rate: rate as u32,
            v_max,
            v_min,
        })
    }

    /// Builds a waveform from separate time and value columns.
    pub fn from_columns(times: &[f64], values: &[f64]) -> FlickerResult<Self> {
        if times.len() != values.len() {
            return Err(FlickerError::InvalidWaveform(format!(
                "column length mismatch: {} times, {} values",
                times.len(),
                values.len()
            )));
        }
        let samples: Vec<(f64, f64)> = times.iter().cloned().zip(values.iter().cloned()).collect();
        Self::new(&samples)
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Iterates over the `(time, value)` pairs.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().cloned().zip(self.values.iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Samples per second, `round(1 / median Δt)`.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn v_max(&self) -> f64 {
        self.v_max
    }

    pub fn v_min(&self) -> f64 {
        self.v_min
    }

    /// Midrange of the record, `(v_max + v_min) / 2`.
    ///
    /// This is deliberately not the arithmetic mean of the samples: the
    /// zero-crossing reference and the period slicing both use the midrange.
    pub fn v_avg(&self) -> f64 {
        (self.v_max + self.v_min) / 2.0
    }

    /// Peak-to-peak amplitude.
    pub fn v_pp(&self) -> f64 {
        self.v_max - self.v_min
    }

    /// Mean spacing between samples in seconds.
    pub fn mean_interval(&self) -> f64 {
        self.duration() / (self.len() - 1) as f64
    }

    /// Time span covered by the record in seconds.
    pub fn duration(&self) -> f64 {
        self.times[self.times.len() - 1] - self.times[0]
    }

    /// Returns a copy of this waveform smoothed with a Savitzky-Golay filter.
    ///
    /// The window is forced odd and clamped to the record length; the time
    /// column is kept as is.
    ///
    /// # Arguments
    /// * `window_length` - Filter window in samples. Larger means smoother
    pub fn denoise(&self, window_length: usize) -> FlickerResult<Waveform> {
        let mut window = window_length.clamp(MIN_DENOISE_WINDOW, self.len());
        if window % 2 == 0 {
            window -= 1;
        }

        let smoothed = preprocess::savgol_filter(&self.values, window, DENOISE_POLY_ORDER)?;
        debug!("[WAVEFORM] Denoised {} samples with window {}", self.len(), window);
        Waveform::from_columns(&self.times, &smoothed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use assert_matches::assert_matches;

    fn ramp(n: usize, dt: f64) -> Vec<(f64, f64)> {
        (0..n).map(|i| (i as f64 * dt, i as f64)).collect()
    }

    #[test]
    fn test_derived_scalars() {
        let samples: Vec<(f64, f64)> = [1.0, 3.0, 2.0, 9.0, 2.0, 1.0, 1.0, 1.0, 1.0, 1.0]
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as f64 * 0.001, v))
            .collect();
        let wf = Waveform::new(&samples).unwrap();

        assert_eq!(wf.sample_rate(), 1000);
        assert_eq!(wf.v_max(), 9.0);
        assert_eq!(wf.v_min(), 1.0);
        assert_eq!(wf.v_pp(), 8.0);
        // Midrange, not the sample mean (which is 2.2).
        assert_eq!(wf.v_avg(), 5.0);
    }

    #[test]
    fn test_sample_rate_uses_median_interval() {
        let mut samples = ramp(20, 1e-4);
        // One long gap must not move the estimate.
        for s in samples.iter_mut().skip(10) {
            s.0 += 0.05;
        }
        let wf = Waveform::new(&samples).unwrap();
        assert_eq!(wf.sample_rate(), 10_000);
    }

    #[test]
    fn test_unusable_rows_are_dropped() {
        let mut samples = ramp(12, 0.01);
        samples[3].1 = f64::NAN;
        samples[7].0 = samples[6].0; // repeated timestamp
        let wf = Waveform::new(&samples).unwrap();
        assert_eq!(wf.len(), 10);
        assert!(wf.values().iter().all(|v| v.is_finite()));

        let kept: Vec<(f64, f64)> = wf.samples().collect();
        assert_eq!(kept.len(), 10);
        assert_eq!(kept[0], (0.0, 0.0));
        assert!(kept.windows(2).all(|w| w[1].0 > w[0].0));
        assert!(kept.iter().all(|&(_, v)| v != 3.0 && v != 7.0));
    }

    #[test]
    fn test_two_valid_samples_is_invalid() {
        let mut samples = ramp(12, 0.01);
        for s in samples.iter_mut().skip(2) {
            s.1 = f64::INFINITY;
        }
        assert_matches!(Waveform::new(&samples), Err(FlickerError::InvalidWaveform(_)));
    }

    #[test]
    fn test_single_sample_is_invalid() {
        assert_matches!(
            Waveform::new(&[(0.0, 1.0)]),
            Err(FlickerError::InvalidWaveform(msg)) if msg.contains("fewer than 2")
        );
    }

    #[test]
    fn test_column_mismatch() {
        assert_matches!(
            Waveform::from_columns(&[0.0, 1.0], &[1.0]),
            Err(FlickerError::InvalidWaveform(_))
        );
    }

    #[test]
    fn test_mean_interval_and_duration() {
        let wf = Waveform::new(&ramp(11, 0.5)).unwrap();
        assert_relative_eq!(wf.duration(), 5.0);
        assert_relative_eq!(wf.mean_interval(), 0.5);
    }

    #[test]
    fn test_denoise_returns_new_waveform() {
        let samples: Vec<(f64, f64)> = (0..200)
            .map(|i| {
                let spike = if i == 100 { 5.0 } else { 0.0 };
                (i as f64 * 1e-3, 1.0 + spike)
            })
            .collect();
        let wf = Waveform::new(&samples).unwrap();
        let smooth = wf.denoise(21).unwrap();

        assert_eq!(smooth.len(), wf.len());
        assert_eq!(smooth.times(), wf.times());
        assert!(smooth.v_max() < wf.v_max());
        // The original is untouched.
        assert_eq!(wf.v_max(), 6.0);
    }
}
