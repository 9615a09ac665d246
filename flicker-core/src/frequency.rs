//! # Frequency Estimation Module
//!
//! Estimates the fundamental flicker frequency of a preprocessed waveform with
//! four independent methods whose candidates are reconciled by
//! [`crate::consensus`].
//!
//! ## Methods
//! - FFT peak picking with harmonic-aware fundamental selection
//! - Autocorrelation (first significant lag peak)
//! - Zero-crossing cycle statistics
//! - Analytic-signal envelope (secondary, needs corroboration)
//!
//! Every method is best-effort: numerical trouble or a missing peak turns into
//! "no candidate" at the method boundary and never aborts the analysis.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::consensus;
use crate::error::{FlickerError, FlickerResult};
use crate::fft;
use crate::peaks::{find_peaks, parabolic_vertex};
use crate::preprocess;
use crate::stats;

/// Lowest fundamental any method reports.
pub const MIN_FREQUENCY_HZ: f64 = 10.0;
/// Upper bound for the spectral and autocorrelation methods.
pub const PRIMARY_MAX_HZ: f64 = 1000.0;
/// Upper bound for the time-domain counting methods.
pub const COUNTING_MAX_HZ: f64 = 2000.0;

/// Relative peak height (of the in-band maximum) for spectral and lag peaks.
const RELATIVE_PEAK_HEIGHT: f64 = 0.10;
/// Harmonics 2..=5 are checked when choosing the FFT fundamental.
const FFT_HARMONICS: std::ops::RangeInclusive<u32> = 2..=5;
/// Relative tolerance when matching a harmonic peak.
const FFT_HARMONIC_TOLERANCE: f64 = 0.05;
/// At least two full cycles.
const MIN_ZERO_CROSSINGS: usize = 4;
/// Results this far (relative) outside a method's range are pulled onto the
/// range limit instead of being dropped.
const RANGE_SLACK: f64 = 0.01;
/// Envelope peaks must rise this many standard deviations above the trend.
const ENVELOPE_PEAK_STDS: f64 = 0.10;
const MIN_ENVELOPE_PEAKS: usize = 3;

/// The estimation methods, in the fixed order used for consensus input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    Fft,
    Autocorrelation,
    ZeroCrossing,
    Envelope,
}

impl EstimationMethod {
    pub const ALL: [EstimationMethod; 4] = [
        EstimationMethod::Fft,
        EstimationMethod::Autocorrelation,
        EstimationMethod::ZeroCrossing,
        EstimationMethod::Envelope,
    ];

    /// Primary methods are trusted on their own; the envelope method only
    /// counts when a primary method agrees with it.
    pub fn is_primary(self) -> bool {
        !matches!(self, EstimationMethod::Envelope)
    }

    /// Inclusive range of frequencies this method may report.
    pub fn valid_range(self) -> (f64, f64) {
        match self {
            EstimationMethod::Fft | EstimationMethod::Autocorrelation => (MIN_FREQUENCY_HZ, PRIMARY_MAX_HZ),
            EstimationMethod::ZeroCrossing | EstimationMethod::Envelope => (MIN_FREQUENCY_HZ, COUNTING_MAX_HZ),
        }
    }

    /// Runs this method, turning any failure or out-of-range result into `None`.
    ///
    /// A result within [`RANGE_SLACK`] of a range limit is clamped onto it, so
    /// a fundamental sitting exactly on a band limit survives estimation jitter.
    ///
    /// # Arguments
    /// * `signal` - Centered (preprocessed) signal
    /// * `sample_rate` - Sample rate in Hz
    pub fn estimate(self, signal: &[f64], sample_rate: f64) -> Option<FrequencyCandidate> {
        let result = match self {
            EstimationMethod::Fft => fft_estimate(signal, sample_rate),
            EstimationMethod::Autocorrelation => autocorrelation_estimate(signal, sample_rate),
            EstimationMethod::ZeroCrossing => zero_crossing_estimate(signal, sample_rate),
            EstimationMethod::Envelope => envelope_estimate(signal, sample_rate),
        };

        let (lo, hi) = self.valid_range();
        let in_range = |v: f64| v >= lo * (1.0 - RANGE_SLACK) && v <= hi * (1.0 + RANGE_SLACK);
        match result {
            Ok(value) if value.is_finite() && in_range(value) => {
                let value = value.clamp(lo, hi);
                debug!("[FREQ] {} candidate: {:.3} Hz", self, value);
                Some(FrequencyCandidate { value, method: self })
            }
            Ok(value) => {
                debug!("[FREQ] {} result {:.3} Hz outside [{}, {}] Hz", self, value, lo, hi);
                None
            }
            Err(e) => {
                debug!("[FREQ] {} found no candidate: {}", self, e);
                None
            }
        }
    }
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationMethod::Fft => write!(f, "fft"),
            EstimationMethod::Autocorrelation => write!(f, "autocorrelation"),
            EstimationMethod::ZeroCrossing => write!(f, "zero_crossing"),
            EstimationMethod::Envelope => write!(f, "envelope"),
        }
    }
}

/// A frequency proposed by one estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyCandidate {
    /// Frequency in Hz
    pub value: f64,
    pub method: EstimationMethod,
}

/// The ensemble's answer together with what each method proposed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyEstimate {
    /// Fundamental frequency in Hz
    pub frequency: f64,
    /// Candidates in method order (methods without a result are absent)
    pub candidates: Vec<FrequencyCandidate>,
    /// True when no candidate survived and the configured fallback was used
    pub fallback_used: bool,
}

/// Estimates the fundamental frequency of a preprocessed signal.
///
/// Runs all four methods (on scoped threads when
/// `config.parallel_estimation` is set) and resolves their candidates. The
/// candidate list is always in [`EstimationMethod::ALL`] order, so the
/// parallel and sequential paths give identical results.
pub fn estimate_frequency(signal: &[f64], sample_rate: f64, config: &AnalysisConfig) -> FrequencyEstimate {
    let candidates = if config.parallel_estimation {
        collect_parallel(signal, sample_rate)
    } else {
        EstimationMethod::ALL
            .iter()
            .filter_map(|m| m.estimate(signal, sample_rate))
            .collect()
    };

    let decision = consensus::select(&candidates, config.fallback_frequency_hz);
    info!(
        "[FREQ] {} candidate(s), consensus {:.3} Hz{}",
        candidates.len(),
        decision.frequency,
        if decision.fallback_used { " (fallback)" } else { "" }
    );

    FrequencyEstimate {
        frequency: decision.frequency,
        candidates,
        fallback_used: decision.fallback_used,
    }
}

fn collect_parallel(signal: &[f64], sample_rate: f64) -> Vec<FrequencyCandidate> {
    let (tx, rx) = crossbeam_channel::unbounded();

    std::thread::scope(|scope| {
        for method in EstimationMethod::ALL {
            let tx = tx.clone();
            scope.spawn(move || {
                // The receiver outlives the scope, so this cannot fail.
                let _ = tx.send((method, method.estimate(signal, sample_rate)));
            });
        }
    });
    drop(tx);

    let mut results: Vec<(EstimationMethod, Option<FrequencyCandidate>)> = rx.iter().collect();
    results.sort_by_key(|(method, _)| *method);
    results.into_iter().filter_map(|(_, c)| c).collect()
}

/// FFT method.
///
/// Hann-windowed, zero-padded spectrum restricted to the primary band and
/// normalized to its maximum. Among peaks of at least 10% height, the
/// lowest-frequency one with a 2nd-5th harmonic also present wins; otherwise
/// the strongest peak. The winning bin is refined by parabolic interpolation
/// on log magnitudes.
pub fn fft_estimate(signal: &[f64], sample_rate: f64) -> FlickerResult<f64> {
    if signal.len() < 2 {
        return Err(FlickerError::Numerical("signal too short for FFT".to_string()));
    }

    let (spectrum, fft_len) = fft::windowed_spectrum(signal);
    let magnitudes = fft::spectrum_to_magnitudes(&spectrum);
    let bin_hz = sample_rate / fft_len as f64;

    // Two extra bins either side: the peak of a tone on a band limit can fall on
    // the first bin past it, and that bin still needs a neighbour to be a local maximum.
    let lo = ((MIN_FREQUENCY_HZ / bin_hz).ceil() as usize).saturating_sub(2);
    let hi = ((PRIMARY_MAX_HZ / bin_hz).floor() as usize + 2).min(magnitudes.len() - 1);
    if lo + 2 > hi {
        return Err(FlickerError::Numerical("search band outside the spectrum".to_string()));
    }

    let band = &magnitudes[lo..=hi];
    let max = band.iter().cloned().fold(0.0, f64::max);
    if !(max > 0.0) {
        return Err(FlickerError::Numerical("no spectral energy in band".to_string()));
    }
    let normalized: Vec<f64> = band.iter().map(|m| m / max).collect();

    let distance = (sample_rate / 1000.0).round().max(1.0) as usize;
    let peaks: Vec<(usize, f64, f64)> = find_peaks(&normalized, Some(RELATIVE_PEAK_HEIGHT), distance)
        .into_iter()
        .map(|p| {
            let bin = lo + p;
            (bin, bin as f64 * bin_hz, normalized[p])
        })
        .filter(|&(_, freq, _)| (MIN_FREQUENCY_HZ - bin_hz..=PRIMARY_MAX_HZ + bin_hz).contains(&freq))
        .collect();

    let chosen_bin = select_fundamental_peak(&peaks)
        .ok_or_else(|| FlickerError::Numerical("no spectral peaks in band".to_string()))?;

    Ok(refine_bin(&magnitudes, chosen_bin) * bin_hz)
}

/// Picks the fundamental among `(bin, frequency, magnitude)` peaks.
fn select_fundamental_peak(peaks: &[(usize, f64, f64)]) -> Option<usize> {
    let mut by_magnitude = peaks.to_vec();
    by_magnitude.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    let strongest = by_magnitude.first()?;
    if by_magnitude.len() == 1 {
        return Some(strongest.0);
    }

    let has_harmonic = |freq: f64| {
        FFT_HARMONICS.clone().any(|h| {
            let expected = freq * h as f64;
            peaks
                .iter()
                .any(|&(_, other, _)| (other - expected).abs() <= FFT_HARMONIC_TOLERANCE * expected)
        })
    };

    by_magnitude
        .iter()
        .filter(|&&(_, freq, _)| has_harmonic(freq))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|&(bin, _, _)| bin)
        .or(Some(strongest.0))
}

/// Sub-bin peak position from the log magnitudes around `bin`.
fn refine_bin(magnitudes: &[f64], bin: usize) -> f64 {
    if bin == 0 || bin + 1 >= magnitudes.len() {
        return bin as f64;
    }
    let logs = [
        magnitudes[bin - 1].ln(),
        magnitudes[bin].ln(),
        magnitudes[bin + 1].ln(),
    ];
    if logs.iter().any(|y| !y.is_finite()) {
        return parabolic_vertex(magnitudes, bin);
    }
    bin as f64 - 1.0 + parabolic_vertex(&logs, 1)
}

/// Autocorrelation method.
///
/// Normalized FFT autocorrelation of the centered signal; the first local
/// peak of at least 10% of the maximum inside the lag window for the primary
/// band gives the period. Without such a peak the largest correlation after
/// the autocorrelation first turns negative is used, so the decaying head near
/// lag zero is never mistaken for a period.
pub fn autocorrelation_estimate(signal: &[f64], sample_rate: f64) -> FlickerResult<f64> {
    let n = signal.len();
    if n < 4 {
        return Err(FlickerError::Numerical("signal too short for autocorrelation".to_string()));
    }

    let centered = preprocess::center(signal);
    let acf = fft::autocorrelate(&centered);
    let zero_lag = acf[0];
    if !(zero_lag > 0.0) {
        return Err(FlickerError::Numerical("zero-energy signal".to_string()));
    }
    let normalized: Vec<f64> = acf.iter().map(|v| v / zero_lag).collect();

    // One lag of slack at each end so a period right at a band limit is still a
    // local peak rather than the window edge.
    let lag_min = ((sample_rate / PRIMARY_MAX_HZ).floor() as usize).saturating_sub(1).max(1);
    let lag_max = ((sample_rate / MIN_FREQUENCY_HZ).ceil() as usize + 1).min(n - 2);
    if lag_min + 2 > lag_max {
        return Err(FlickerError::Numerical("record too short for the lag window".to_string()));
    }

    let window = &normalized[lag_min..=lag_max];
    let window_max = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(window_max > 0.0) {
        return Err(FlickerError::Numerical("no positive correlation in lag window".to_string()));
    }

    let peak_lag = match find_peaks(window, Some(RELATIVE_PEAK_HEIGHT * window_max), 1).first() {
        Some(&p) => lag_min + p,
        None => strongest_lag_after_decay(&normalized, lag_min, lag_max)?,
    };

    let lag = parabolic_vertex(&normalized, peak_lag);
    if !(lag > 0.0) {
        return Err(FlickerError::Numerical("non-positive lag".to_string()));
    }
    Ok(sample_rate / lag)
}

/// Largest normalized autocorrelation in `lag_min..=lag_max` past the first
/// negative value.
fn strongest_lag_after_decay(normalized: &[f64], lag_min: usize, lag_max: usize) -> FlickerResult<usize> {
    let first_negative = normalized
        .iter()
        .position(|&v| v < 0.0)
        .ok_or_else(|| FlickerError::Numerical("autocorrelation never turns negative".to_string()))?;

    let start = first_negative.max(lag_min);
    if start > lag_max {
        return Err(FlickerError::Numerical("no lag past the decaying head".to_string()));
    }
    let offset = stats::argmax(&normalized[start..=lag_max])
        .ok_or_else(|| FlickerError::Numerical("empty lag window".to_string()))?;
    let lag = start + offset;
    if !(normalized[lag] > 0.0) {
        return Err(FlickerError::Numerical("no positive correlation past the decaying head".to_string()));
    }
    Ok(lag)
}

/// Zero-crossing method.
///
/// Crossings of the signal's midrange are located with linear interpolation.
/// Each full-cycle span (every third crossing minus the first) covers one
/// rising and one falling half-cycle, which keeps asymmetric waveforms such
/// as rectified mains from alternating between two interval lengths. Spans
/// further than two standard deviations from the median are discarded, and
/// `f = sample_rate / mean span`.
pub fn zero_crossing_estimate(signal: &[f64], sample_rate: f64) -> FlickerResult<f64> {
    let crossings = zero_crossings(signal);
    if crossings.len() < MIN_ZERO_CROSSINGS {
        return Err(FlickerError::Numerical(format!(
            "{} zero crossings, need at least {}",
            crossings.len(),
            MIN_ZERO_CROSSINGS
        )));
    }

    let spans: Vec<f64> = crossings.windows(3).map(|w| w[2] - w[0]).collect();
    let median = stats::median(&spans).unwrap_or(0.0);
    let sd = stats::std_dev(&spans).unwrap_or(0.0);

    let mut retained: Vec<f64> = spans
        .iter()
        .cloned()
        .filter(|x| (x - median).abs() <= 2.0 * sd)
        .collect();
    if retained.is_empty() {
        retained = spans;
    }

    let mean_span = stats::mean(&retained).unwrap_or(0.0);
    if !(mean_span > 0.0) {
        return Err(FlickerError::Numerical("degenerate crossing spans".to_string()));
    }
    Ok(sample_rate / mean_span)
}

/// Fractional sample positions where `signal` crosses its midrange.
fn zero_crossings(signal: &[f64]) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    let max = signal.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = signal.iter().cloned().fold(f64::INFINITY, f64::min);
    if max == min {
        return Vec::new();
    }
    let mid = (max + min) / 2.0;

    signal
        .windows(2)
        .enumerate()
        .filter_map(|(i, w)| {
            let (a, b) = (w[0] - mid, w[1] - mid);
            if (a < 0.0) != (b < 0.0) {
                Some(i as f64 + a / (a - b))
            } else {
                None
            }
        })
        .collect()
}

/// Envelope method.
///
/// Detrended analytic-signal envelope; peaks at least `0.1 σ` above the trend
/// are located to sub-sample precision and the median spacing gives the
/// modulation frequency.
pub fn envelope_estimate(signal: &[f64], sample_rate: f64) -> FlickerResult<f64> {
    if signal.len() < 4 {
        return Err(FlickerError::Numerical("signal too short for an envelope".to_string()));
    }

    let centered = preprocess::center(signal);
    let envelope: Vec<f64> = fft::analytic_signal(&centered).iter().map(|c| c.norm()).collect();
    let detrended = preprocess::detrend(&envelope);

    let sd = stats::std_dev(&detrended).unwrap_or(0.0);
    if !(sd > 1e-12) {
        return Err(FlickerError::Numerical("flat envelope".to_string()));
    }

    let peaks = find_peaks(&detrended, Some(ENVELOPE_PEAK_STDS * sd), 1);
    if peaks.len() < MIN_ENVELOPE_PEAKS {
        return Err(FlickerError::Numerical(format!("{} envelope peaks", peaks.len())));
    }

    let positions: Vec<f64> = peaks.iter().map(|&p| parabolic_vertex(&detrended, p)).collect();
    let spacings: Vec<f64> = positions.windows(2).map(|w| w[1] - w[0]).collect();
    let spacing = stats::median(&spacings).unwrap_or(0.0);
    if !(spacing > 0.0) {
        return Err(FlickerError::Numerical("degenerate envelope peak spacing".to_string()));
    }
    Ok(sample_rate / spacing)
}
