// flicker-core/src/lib.rs

//! The core logic for light flicker analysis.
//! This crate takes a sampled light-output (or voltage) waveform and derives
//! its flicker frequency, percent flicker, flicker index and RMS variation,
//! then classifies the result against IEEE 1789-2015, California JA8 2019 and
//! WELL v2 L07. It is completely headless: no file parsing, plotting or CLI.

pub mod config;
pub mod consensus;
pub mod error;
pub mod fft;
pub mod frequency;
pub mod metrics;
pub mod peaks;
pub mod period;
pub mod preprocess;
pub mod spectrum;
pub mod standards;
pub mod stats;
pub mod synth;
pub mod waveform;

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use config::{AnalysisConfig, DEFAULT_FALLBACK_FREQUENCY_HZ};
pub use error::{FlickerError, FlickerResult};
pub use frequency::{EstimationMethod, FrequencyCandidate, FrequencyEstimate};
pub use period::PeriodSlice;
pub use spectrum::SpectrumReport;
pub use standards::{IeeeRisk, StandardsResult};
pub use waveform::Waveform;

/// The result of analyzing one waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlickerReport {
    pub v_max: f64,
    pub v_min: f64,
    pub v_pp: f64,
    /// Midrange, `(v_max + v_min) / 2`
    pub v_avg: f64,
    /// Fundamental flicker frequency in Hz
    pub frequency: f64,
    /// Period in seconds
    pub period: f64,
    pub percent_flicker: f64,
    pub flicker_index: f64,
    pub rms_variation: f64,
    /// Samples per second
    pub sample_rate: u32,
    pub ieee_1789_2015: IeeeRisk,
    pub california_ja8_2019: bool,
    pub well_standard_v2: bool,
}

impl FlickerReport {
    /// Human-readable summary.
    ///
    /// The short form lists frequency, percent flicker and flicker index; the
    /// verbose form adds the period, sample rate, voltages and standards.
    pub fn summary(&self, verbose: bool) -> String {
        let mut out = format!(
            "Frequency: {:.1} Hz\nPercent Flicker: {:.1}%\nFlicker Index: {:.1}",
            self.frequency, self.percent_flicker, self.flicker_index
        );

        if verbose {
            // Writing into a String cannot fail.
            let _ = write!(
                out,
                "\nPeriod: {} s\nFrame Rate: {} samples per second\nV_min: {:.1} V\nV_max: {:.1} V\nV_avg: {:.1} V\nV_pp: {:.1} V\nIEEE 1789-2015: {}\nWELL v2 L7: {}\nCalifornia JA8 2019: {}",
                self.period,
                group_thousands(self.sample_rate),
                self.v_min,
                self.v_max,
                self.v_avg,
                self.v_pp,
                self.ieee_1789_2015,
                standards::pass_fail(self.well_standard_v2),
                standards::pass_fail(self.california_ja8_2019),
            );
        }
        out
    }

    /// The report as a JSON object with the field names above.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn standards(&self) -> StandardsResult {
        StandardsResult {
            ieee_1789_2015: self.ieee_1789_2015,
            california_ja8_2019: self.california_ja8_2019,
            well_standard_v2: self.well_standard_v2,
        }
    }
}

/// `10000` -> `"10,000"`
fn group_thousands(value: u32) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// A [`FlickerReport`] together with the display spectrum and the
/// estimator diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComprehensiveReport {
    #[serde(flatten)]
    pub report: FlickerReport,
    pub fft_dominant_frequency: f64,
    pub fft_frequencies: Vec<f64>,
    pub fft_magnitudes: Vec<f64>,
    /// What each estimation method proposed
    pub frequency_candidates: Vec<FrequencyCandidate>,
    /// True when the reported frequency is the configured fallback
    pub frequency_fallback_used: bool,
}

/// Analyzes `(time, value)` samples with the default configuration.
///
/// # Errors
/// * `InvalidWaveform` if the samples do not form a usable waveform
/// * `InsufficientData` if the record is shorter than one flicker period
///   after the first rising edge
pub fn analyze(samples: &[(f64, f64)]) -> FlickerResult<FlickerReport> {
    let waveform = Waveform::new(samples)?;
    analyze_waveform(&waveform, &AnalysisConfig::default())
}

/// Analyzes a waveform.
///
/// The waveform is optionally denoised, a preprocessed copy drives the
/// frequency estimators, and the amplitude metrics are computed on the
/// (possibly denoised) samples over exactly one period.
pub fn analyze_waveform(waveform: &Waveform, config: &AnalysisConfig) -> FlickerResult<FlickerReport> {
    run_analysis(waveform, config).map(|(report, _)| report)
}

/// [`analyze_waveform`] plus the display spectrum and estimator diagnostics.
pub fn analyze_comprehensive(waveform: &Waveform, config: &AnalysisConfig) -> FlickerResult<ComprehensiveReport> {
    let (report, estimate) = run_analysis(waveform, config)?;
    let spectrum = spectrum::compute(
        waveform.values(),
        waveform.sample_rate() as f64,
        config.spectrum_max_frequency_hz,
    );

    Ok(ComprehensiveReport {
        report,
        fft_dominant_frequency: spectrum.dominant_frequency,
        fft_frequencies: spectrum.frequencies,
        fft_magnitudes: spectrum.magnitudes,
        frequency_candidates: estimate.candidates,
        frequency_fallback_used: estimate.fallback_used,
    })
}

/// Normalized display spectrum of `waveform`, up to 3 kHz.
pub fn spectrum(waveform: &Waveform, sample_rate: f64) -> SpectrumReport {
    spectrum::compute(waveform.values(), sample_rate, config::DEFAULT_SPECTRUM_MAX_HZ)
}

fn run_analysis(waveform: &Waveform, config: &AnalysisConfig) -> FlickerResult<(FlickerReport, FrequencyEstimate)> {
    let denoised;
    let waveform = match config.denoise_window {
        Some(window) => {
            denoised = waveform.denoise(window)?;
            &denoised
        }
        None => waveform,
    };

    let sample_rate = waveform.sample_rate() as f64;
    let prepared = preprocess::preprocess(waveform.values(), sample_rate, config);
    let estimate = frequency::estimate_frequency(&prepared, sample_rate, config);
    let frequency = estimate.frequency;

    let slice = period::n_periods(waveform, frequency, config.num_periods.max(1))?;
    let one_period = &slice.values[..slice.samples_per_period];

    let percent_flicker = metrics::percent_flicker(waveform.v_pp(), waveform.v_max());
    let flicker_index = metrics::flicker_index(one_period, waveform.v_avg());
    let rms_variation = metrics::rms_variation(waveform.values());
    let standards = StandardsResult::evaluate(frequency, percent_flicker);

    info!(
        "[ANALYZE] {} samples @ {} Hz: {:.2} Hz, {:.2}% flicker, FI {:.4}, IEEE {}",
        waveform.len(),
        waveform.sample_rate(),
        frequency,
        percent_flicker,
        flicker_index,
        standards.ieee_1789_2015
    );

    let report = FlickerReport {
        v_max: waveform.v_max(),
        v_min: waveform.v_min(),
        v_pp: waveform.v_pp(),
        v_avg: waveform.v_avg(),
        frequency,
        period: 1.0 / frequency,
        percent_flicker,
        flicker_index,
        rms_variation,
        sample_rate: waveform.sample_rate(),
        ieee_1789_2015: standards.ieee_1789_2015,
        california_ja8_2019: standards.california_ja8_2019,
        well_standard_v2: standards.well_standard_v2,
    };
    Ok((report, estimate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn report() -> FlickerReport {
        FlickerReport {
            v_max: 1.05,
            v_min: 0.95,
            v_pp: 0.1,
            v_avg: 1.0,
            frequency: 120.04,
            period: 1.0 / 120.04,
            percent_flicker: 9.52,
            flicker_index: 0.0318,
            rms_variation: 3.5,
            sample_rate: 10_000,
            ieee_1789_2015: IeeeRisk::LowRisk,
            california_ja8_2019: true,
            well_standard_v2: true,
        }
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(7), "7");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(250_000), "250,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_short_summary() {
        assert_eq!(
            report().summary(false),
            "Frequency: 120.0 Hz\nPercent Flicker: 9.5%\nFlicker Index: 0.0"
        );
    }

    #[test]
    fn test_verbose_summary() {
        let text = report().summary(true);
        assert!(text.contains("Frame Rate: 10,000 samples per second"));
        assert!(text.contains("IEEE 1789-2015: Low Risk"));
        assert!(text.contains("WELL v2 L7: Pass"));
        assert!(text.ends_with("California JA8 2019: Pass"));
    }

    #[test]
    fn test_json_field_names() {
        let value: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "v_max",
            "v_min",
            "v_pp",
            "v_avg",
            "frequency",
            "period",
            "percent_flicker",
            "flicker_index",
            "rms_variation",
            "sample_rate",
            "ieee_1789_2015",
            "california_ja8_2019",
            "well_standard_v2",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert_eq!(object.len(), 13);
        assert_eq!(object["ieee_1789_2015"], "Low Risk");
    }

    #[test]
    fn test_standards_view_matches_classifiers() {
        let report = report();
        assert_eq!(
            report.standards(),
            StandardsResult::evaluate(report.frequency, report.percent_flicker)
        );

        let analyzed = analyze(&synth::sine_flicker(60.0, 0.2, 10_000.0, 40.0)).unwrap();
        let standards = analyzed.standards();
        assert_eq!(standards.ieee_1789_2015, IeeeRisk::HighRisk);
        assert!(!standards.california_ja8_2019);
        assert!(!standards.well_standard_v2);
    }

    #[test]
    #[traced_test]
    fn test_analysis_logs_result() {
        let samples = synth::sine_flicker(120.0, 0.1, 10_000.0, 5.0);
        analyze(&samples).unwrap();
        assert!(logs_contain("[ANALYZE]"));
        assert!(logs_contain("[FREQ]"));
    }

    #[test]
    #[traced_test]
    fn test_flat_waveform_logs_fallback() {
        let samples: Vec<(f64, f64)> = (0..1_000).map(|i| (i as f64 * 1e-4, 0.8)).collect();
        let report = analyze(&samples).unwrap();
        assert_eq!(report.frequency, DEFAULT_FALLBACK_FREQUENCY_HZ);
        assert!(logs_contain("(fallback)"));
    }
}
