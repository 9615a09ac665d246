//! # Analysis Configuration
//!
//! Tunables for the analysis pipeline. Every field has a default, so a
//! partial JSON file or an empty environment yields a usable configuration.
//!
//! ## Sources
//! - [`AnalysisConfig::default`]
//! - JSON files via [`AnalysisConfig::load`] / [`AnalysisConfig::save`]
//! - Environment overlay via [`AnalysisConfig::from_env`]

use std::env;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Frequency reported when no estimator produces a usable candidate.
///
/// 120 Hz is the flicker of full-wave rectified 60 Hz mains, the most common
/// flicker source for the lamps this crate is aimed at.
pub const DEFAULT_FALLBACK_FREQUENCY_HZ: f64 = 120.0;

/// Upper frequency bound of the display spectrum.
pub const DEFAULT_SPECTRUM_MAX_HZ: f64 = 3000.0;

/// Configuration for a single analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Frequency used when the estimator ensemble finds nothing
    pub fallback_frequency_hz: f64,
    /// Median filter kernel in samples (odd, ≥ 3)
    pub median_kernel: usize,
    /// Largest Savitzky-Golay window the preprocessor may use
    pub savgol_max_window: usize,
    /// Savitzky-Golay polynomial order for preprocessing
    pub savgol_poly_order: usize,
    /// Run the four frequency estimators on separate threads
    pub parallel_estimation: bool,
    /// Periods sliced by the period extractor for the report
    pub num_periods: usize,
    /// Upper bound of the display spectrum in Hz
    pub spectrum_max_frequency_hz: f64,
    /// Smooth the waveform itself before analysis (window in samples)
    pub denoise_window: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fallback_frequency_hz: DEFAULT_FALLBACK_FREQUENCY_HZ,
            median_kernel: 3,
            savgol_max_window: 51,
            savgol_poly_order: 3,
            parallel_estimation: false,
            num_periods: 1,
            spectrum_max_frequency_hz: DEFAULT_SPECTRUM_MAX_HZ,
            denoise_window: None,
        }
    }
}

impl AnalysisConfig {
    /// Checks that every field is usable by the pipeline.
    pub fn validate(&self) -> Result<()> {
        if !self.fallback_frequency_hz.is_finite() || self.fallback_frequency_hz <= 0.0 {
            bail!("fallback_frequency_hz must be a positive number, got {}", self.fallback_frequency_hz);
        }
        if self.median_kernel < 3 || self.median_kernel % 2 == 0 {
            bail!("median_kernel must be odd and at least 3, got {}", self.median_kernel);
        }
        if self.savgol_max_window < self.savgol_poly_order + 2 {
            bail!(
                "savgol_max_window {} is too small for polynomial order {}",
                self.savgol_max_window,
                self.savgol_poly_order
            );
        }
        if self.num_periods == 0 {
            bail!("num_periods must be at least 1");
        }
        if !self.spectrum_max_frequency_hz.is_finite() || self.spectrum_max_frequency_hz <= 0.0 {
            bail!(
                "spectrum_max_frequency_hz must be a positive number, got {}",
                self.spectrum_max_frequency_hz
            );
        }
        if let Some(window) = self.denoise_window {
            if window < 3 {
                bail!("denoise_window must be at least 3 samples, got {}", window);
            }
        }
        Ok(())
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let mut data = String::new();
        file.read_to_string(&mut data)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AnalysisConfig =
            serde_json::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        info!("[CONFIG] Loaded analysis config from {}", path.display());
        Ok(config)
    }

    /// Saves this configuration as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path).with_context(|| format!("creating config {}", path.display()))?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }

    /// Defaults overlaid with `FLICKER_*` environment variables.
    ///
    /// Recognized: `FLICKER_FALLBACK_HZ`, `FLICKER_PARALLEL`,
    /// `FLICKER_MEDIAN_KERNEL`, `FLICKER_DENOISE_WINDOW`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = env::var("FLICKER_FALLBACK_HZ") {
            config.fallback_frequency_hz = v
                .parse()
                .with_context(|| format!("invalid value for FLICKER_FALLBACK_HZ: {v}"))?;
        }
        if let Ok(v) = env::var("FLICKER_PARALLEL") {
            config.parallel_estimation = parse_flag(&v)
                .with_context(|| format!("invalid value for FLICKER_PARALLEL: {v}"))?;
        }
        if let Ok(v) = env::var("FLICKER_MEDIAN_KERNEL") {
            config.median_kernel = v
                .parse()
                .with_context(|| format!("invalid value for FLICKER_MEDIAN_KERNEL: {v}"))?;
        }
        if let Ok(v) = env::var("FLICKER_DENOISE_WINDOW") {
            config.denoise_window = Some(
                v.parse()
                    .with_context(|| format!("invalid value for FLICKER_DENOISE_WINDOW: {v}"))?,
            );
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(format!("flicker-core-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fallback_frequency_hz, 120.0);
        assert_eq!(config.num_periods, 1);
        assert!(!config.parallel_estimation);
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("save-load");
        let config = AnalysisConfig {
            parallel_estimation: true,
            denoise_window: Some(101),
            ..AnalysisConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = AnalysisConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = temp_path("partial");
        std::fs::write(&path, r#"{ "fallback_frequency_hz": 100.0 }"#).unwrap();
        let loaded = AnalysisConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.fallback_frequency_hz, 100.0);
        assert_eq!(loaded.median_kernel, 3);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let path = temp_path("invalid");
        std::fs::write(&path, r#"{ "median_kernel": 4 }"#).unwrap();
        let err = AnalysisConfig::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(err.to_string().contains("median_kernel"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AnalysisConfig::load(temp_path("does-not-exist")).unwrap_err();
        assert!(err.to_string().contains("opening config"));
    }

    #[test]
    fn test_env_overlay() {
        temp_env::with_vars(
            [
                ("FLICKER_FALLBACK_HZ", Some("100")),
                ("FLICKER_PARALLEL", Some("yes")),
                ("FLICKER_MEDIAN_KERNEL", None),
                ("FLICKER_DENOISE_WINDOW", Some("201")),
            ],
            || {
                let config = AnalysisConfig::from_env().unwrap();
                assert_eq!(config.fallback_frequency_hz, 100.0);
                assert!(config.parallel_estimation);
                assert_eq!(config.median_kernel, 3);
                assert_eq!(config.denoise_window, Some(201));
            },
        );
    }

    #[test]
    fn test_env_overlay_rejects_garbage() {
        temp_env::with_var("FLICKER_PARALLEL", Some("maybe"), || {
            assert!(AnalysisConfig::from_env().is_err());
        });
    }
}
