//! # Period Extraction Module
//!
//! Cuts a whole number of flicker periods out of a waveform, starting at the
//! first rising crossing of the midrange so that every slice begins at the
//! same phase.

use serde::Serialize;
use tracing::debug;

use crate::error::{FlickerError, FlickerResult};
use crate::waveform::Waveform;

/// A run of whole periods, time-shifted to start at zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSlice {
    /// Sample times relative to the first sample of the slice
    pub times: Vec<f64>,
    pub values: Vec<f64>,
    /// Index of the first sample in the source waveform
    pub start_index: usize,
    pub num_periods: usize,
    pub samples_per_period: usize,
}

impl PeriodSlice {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Index of the first rising crossing of `threshold`.
///
/// A rising edge at `i` means `values[i - 1] < threshold <= values[i]`.
/// The comparison is strict below the threshold and inclusive at it, so a
/// sample landing exactly on the threshold starts the edge.
pub fn find_rising_edge(values: &[f64], threshold: f64) -> Option<usize> {
    (1..values.len()).find(|&i| values[i - 1] < threshold && threshold <= values[i])
}

/// Returns `num_periods` whole periods of `waveform`.
///
/// The slice starts at the first rising edge through `v_avg` (index 0 if the
/// signal never rises through it) and holds
/// `num_periods × round(1 / (frequency × mean Δt))` samples.
///
/// # Arguments
/// * `waveform` - Source record
/// * `frequency` - Fundamental frequency in Hz
/// * `num_periods` - How many periods to cut
///
/// # Errors
/// * `InsufficientData` if the slice runs past the end of the record
/// * `InvalidWaveform` if `frequency` is not positive or `num_periods` is 0
pub fn n_periods(waveform: &Waveform, frequency: f64, num_periods: usize) -> FlickerResult<PeriodSlice> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return Err(FlickerError::InvalidWaveform(format!(
            "cannot slice periods at frequency {frequency}"
        )));
    }
    if num_periods == 0 {
        return Err(FlickerError::InvalidWaveform("num_periods must be at least 1".to_string()));
    }

    let period = 1.0 / frequency;
    let samples_per_period = ((period / waveform.mean_interval()).round() as usize).max(1);

    let start_index = match find_rising_edge(waveform.values(), waveform.v_avg()) {
        Some(i) => i,
        None => {
            debug!("[PERIOD] No rising edge through {:.6}, starting at 0", waveform.v_avg());
            0
        }
    };

    let requested = num_periods * samples_per_period;
    let available = waveform.len() - start_index;
    if requested > available {
        return Err(FlickerError::InsufficientData { requested, available });
    }

    let end = start_index + requested;
    let t0 = waveform.times()[start_index];
    debug!(
        "[PERIOD] {} period(s) of {} samples from index {}",
        num_periods, samples_per_period, start_index
    );

    Ok(PeriodSlice {
        times: waveform.times()[start_index..end].iter().map(|t| t - t0).collect(),
        values: waveform.values()[start_index..end].to_vec(),
        start_index,
        num_periods,
        samples_per_period,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::f64::consts::PI;

    fn sine_waveform(freq: f64, sample_rate: f64, n: usize, phase: f64) -> Waveform {
        let samples: Vec<(f64, f64)> = (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate;
                (t, 1.0 + 0.5 * (2.0 * PI * freq * t + phase).sin())
            })
            .collect();
        Waveform::new(&samples).unwrap()
    }

    #[test]
    fn test_rising_edge_operator() {
        // Strictly below, then at or above
        assert_eq!(find_rising_edge(&[0.0, 1.0], 1.0), Some(1));
        assert_eq!(find_rising_edge(&[1.0, 2.0], 1.0), None);
        // Falling crossings are skipped
        assert_eq!(find_rising_edge(&[2.0, 0.0, 0.5, 2.0], 1.0), Some(3));
        assert_eq!(find_rising_edge(&[3.0, 2.0, 1.0], 1.5), None);
    }

    #[test]
    fn test_slice_starts_on_rising_edge() {
        // Starts falling, so the first rising edge is half a period in
        let wf = sine_waveform(100.0, 10_000.0, 1_000, PI);
        let slice = n_periods(&wf, 100.0, 1).unwrap();

        assert_eq!(slice.samples_per_period, 100);
        assert_eq!(slice.len(), 100);
        assert!(slice.start_index >= 49 && slice.start_index <= 51);
        assert_eq!(slice.times[0], 0.0);
        assert!(wf.values()[slice.start_index - 1] < wf.v_avg());
        assert!(slice.values[0] >= wf.v_avg());
    }

    #[test]
    fn test_multiple_periods() {
        let wf = sine_waveform(50.0, 5_000.0, 2_000, 0.3);
        let slice = n_periods(&wf, 50.0, 3).unwrap();
        assert_eq!(slice.len(), 300);
        assert_eq!(slice.num_periods, 3);
    }

    #[test]
    fn test_slice_past_end_is_insufficient() {
        let wf = sine_waveform(100.0, 10_000.0, 250, 0.0);
        assert_matches!(
            n_periods(&wf, 100.0, 5),
            Err(FlickerError::InsufficientData { requested: 500, .. })
        );
    }

    #[test]
    fn test_no_rising_edge_starts_at_zero() {
        let samples: Vec<(f64, f64)> = (0..20).map(|i| (i as f64 * 0.001, 20.0 - i as f64)).collect();
        let wf = Waveform::new(&samples).unwrap();
        let slice = n_periods(&wf, 100.0, 1).unwrap();
        assert_eq!(slice.start_index, 0);
        assert_eq!(slice.len(), 10);
    }

    #[test]
    fn test_rejects_bad_frequency() {
        let wf = sine_waveform(100.0, 10_000.0, 500, 0.0);
        assert_matches!(n_periods(&wf, 0.0, 1), Err(FlickerError::InvalidWaveform(_)));
        assert_matches!(n_periods(&wf, 100.0, 0), Err(FlickerError::InvalidWaveform(_)));
    }
}
