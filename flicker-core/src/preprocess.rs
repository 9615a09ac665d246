//! # Preprocessing Module
//!
//! Conditions a raw waveform for frequency estimation. The output is a
//! centered, denoised, unit-variance copy of the signal; it is never used for
//! the amplitude-sensitive metrics, which always read the original samples.
//!
//! ## Pipeline
//! 1. Median filter to remove impulse outliers
//! 2. DC removal
//! 3. Savitzky-Golay smoothing (records longer than 50 samples)
//! 4. Normalization by the standard deviation
//!
//! Any failure in the full pipeline falls back to steps 2 and 4 only.

use linreg::linear_regression;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::error::{FlickerError, FlickerResult};
use crate::stats;

/// Records at or below this length skip the smoothing step.
const SMOOTHING_MIN_SAMPLES: usize = 50;

/// Highest fundamental the estimators search for. The smoothing window never
/// spans more than one cycle at this frequency.
const HIGHEST_FUNDAMENTAL_HZ: f64 = 1000.0;

/// Produces the estimator input for `signal`.
///
/// Never fails: if the full pipeline errors or produces non-finite values the
/// result is the centered, normalized signal instead.
pub fn preprocess(signal: &[f64], sample_rate: f64, config: &AnalysisConfig) -> Vec<f64> {
    match full_pipeline(signal, sample_rate, config) {
        Ok(out) if out.iter().all(|x| x.is_finite()) => out,
        Ok(_) => {
            warn!("[PREPROCESS] Non-finite output, using centering and normalization only");
            normalize(&center(signal))
        }
        Err(e) => {
            warn!("[PREPROCESS] {}, using centering and normalization only", e);
            normalize(&center(signal))
        }
    }
}

fn full_pipeline(signal: &[f64], sample_rate: f64, config: &AnalysisConfig) -> FlickerResult<Vec<f64>> {
    if signal.is_empty() {
        return Err(FlickerError::Numerical("empty signal".to_string()));
    }

    let kernel = config.median_kernel.max(3) | 1;
    let filtered = median_filter(signal, kernel);
    let mut centered = center(&filtered);

    if let Some(window) = smoothing_window(
        centered.len(),
        sample_rate,
        config.savgol_max_window,
        config.savgol_poly_order,
    ) {
        debug!(
            "[PREPROCESS] Savitzky-Golay window {} order {} on {} samples",
            window,
            config.savgol_poly_order,
            centered.len()
        );
        centered = savgol_filter(&centered, window, config.savgol_poly_order)?;
    }

    Ok(normalize(&centered))
}

/// Picks the smoothing window for a record of `len` samples.
///
/// Returns `None` for short records. The window is odd, at most
/// `min(max_window, len / 10)` and at most one cycle of the highest searched
/// fundamental, but never narrower than `poly_order + 2`.
pub fn smoothing_window(len: usize, sample_rate: f64, max_window: usize, poly_order: usize) -> Option<usize> {
    if len <= SMOOTHING_MIN_SAMPLES {
        return None;
    }
    let cycle = (sample_rate / HIGHEST_FUNDAMENTAL_HZ).floor().max(0.0) as usize;
    let mut window = max_window.min(len / 10).min(cycle);
    if window % 2 == 0 {
        window = window.saturating_sub(1);
    }
    let floor = (poly_order + 2) | 1;
    let window = window.max(floor);
    if window > len {
        return None;
    }
    Some(window)
}

/// Sliding median with an odd `kernel`; the window shrinks at the edges.
pub fn median_filter(data: &[f64], kernel: usize) -> Vec<f64> {
    let half = kernel / 2;
    let n = data.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            stats::median(&data[lo..hi]).unwrap_or(data[i])
        })
        .collect()
}

/// Removes the mean. A constant signal centers to exact zeros.
pub fn center(data: &[f64]) -> Vec<f64> {
    let avg = stats::mean(data).unwrap_or(0.0);
    let centered: Vec<f64> = data.iter().map(|&x| x - avg).collect();
    // Rounding in the mean would otherwise leave a tiny constant offset.
    if centered.windows(2).all(|w| w[0] == w[1]) {
        return vec![0.0; data.len()];
    }
    centered
}

/// Divides by the standard deviation; a zero-variance signal is returned unchanged.
pub fn normalize(data: &[f64]) -> Vec<f64> {
    match stats::std_dev(data) {
        Some(sd) if sd > 0.0 => data.iter().map(|&x| x / sd).collect(),
        _ => data.to_vec(),
    }
}

/// Removes the least-squares linear trend.
///
/// Falls back to mean removal when the regression is undefined.
pub fn detrend(data: &[f64]) -> Vec<f64> {
    let xs: Vec<f64> = (0..data.len()).map(|i| i as f64).collect();
    match linear_regression::<f64, f64, f64>(&xs, data) {
        Ok((slope, intercept)) => data
            .iter()
            .enumerate()
            .map(|(i, &y)| y - (slope * i as f64 + intercept))
            .collect(),
        Err(_) => center(data),
    }
}

/// Least-squares weights that evaluate a polynomial fit at `eval_at`.
///
/// The fit runs over the `2 * half_width + 1` samples at offsets
/// `-half_width..=half_width`; `eval_at` is an offset in the same units.
/// Offsets are scaled to `[-1, 1]` before solving, which keeps the normal
/// equations well conditioned for wide windows.
pub fn savgol_weights(half_width: usize, poly_order: usize, eval_at: f64) -> FlickerResult<Vec<f64>> {
    if half_width == 0 {
        return Err(FlickerError::Numerical("Savitzky-Golay half-width must be > 0".to_string()));
    }
    let window = 2 * half_width + 1;
    if poly_order >= window {
        return Err(FlickerError::Numerical(format!(
            "polynomial order {poly_order} >= window size {window}"
        )));
    }

    let p = poly_order + 1;
    let scale = half_width as f64;

    // Vandermonde rows: j[i][k] = x_i^k
    let j: Vec<Vec<f64>> = (0..window)
        .map(|i| {
            let x = (i as f64 - scale) / scale;
            let mut row = Vec::with_capacity(p);
            let mut xk = 1.0;
            for _ in 0..p {
                row.push(xk);
                xk *= x;
            }
            row
        })
        .collect();

    // Augmented [JᵀJ | I] for Gauss-Jordan inversion
    let mut aug = vec![vec![0.0; 2 * p]; p];
    for r in 0..p {
        for c in 0..p {
            aug[r][c] = j.iter().map(|row| row[r] * row[c]).sum();
        }
        aug[r][p + r] = 1.0;
    }

    for col in 0..p {
        let pivot_row = (col..p)
            .max_by(|&a, &b| {
                aug[a][col]
                    .abs()
                    .partial_cmp(&aug[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        if pivot.abs() < 1e-12 {
            return Err(FlickerError::Numerical("singular Savitzky-Golay system".to_string()));
        }
        for c in 0..2 * p {
            aug[col][c] /= pivot;
        }
        for r in 0..p {
            if r != col {
                let factor = aug[r][col];
                if factor != 0.0 {
                    for c in 0..2 * p {
                        aug[r][c] -= factor * aug[col][c];
                    }
                }
            }
        }
    }

    // b = [1, t, t², ...] · (JᵀJ)⁻¹, then w_i = Σ_k b_k x_i^k
    let t = eval_at / scale;
    let mut powers = Vec::with_capacity(p);
    let mut tk = 1.0;
    for _ in 0..p {
        powers.push(tk);
        tk *= t;
    }
    let b: Vec<f64> = (0..p)
        .map(|c| (0..p).map(|r| powers[r] * aug[r][p + c]).sum())
        .collect();

    Ok(j.iter()
        .map(|row| row.iter().zip(&b).map(|(x, w)| x * w).sum())
        .collect())
}

/// Savitzky-Golay smoothing with polynomial-fit edges.
///
/// Interior samples use the centered weights. The first and last
/// `window / 2` samples are evaluated from the fit over the first and last
/// full window, so the output has the same length as the input.
pub fn savgol_filter(data: &[f64], window: usize, poly_order: usize) -> FlickerResult<Vec<f64>> {
    if window % 2 == 0 || window > data.len() {
        return Err(FlickerError::Numerical(format!(
            "invalid Savitzky-Golay window {} for {} samples",
            window,
            data.len()
        )));
    }
    let m = window / 2;
    let n = data.len();
    let center_weights = savgol_weights(m, poly_order, 0.0)?;

    let mut out = vec![0.0; n];
    for i in m..n - m {
        out[i] = center_weights
            .iter()
            .zip(&data[i - m..=i + m])
            .map(|(w, x)| w * x)
            .sum();
    }

    let head = &data[..window];
    let tail = &data[n - window..];
    for i in 0..m {
        let w = savgol_weights(m, poly_order, i as f64 - m as f64)?;
        out[i] = w.iter().zip(head).map(|(w, x)| w * x).sum();

        let w = savgol_weights(m, poly_order, (i + 1) as f64)?;
        out[n - m + i] = w.iter().zip(tail).map(|(w, x)| w * x).sum();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_filter_removes_impulse() {
        let data = vec![1.0, 1.0, 1.0, 100.0, 1.0, 1.0, 1.0];
        let out = median_filter(&data, 3);
        assert_eq!(out, vec![1.0; 7]);
    }

    #[test]
    fn test_savgol_weights_match_published_table() {
        // Classic 5-point quadratic/cubic smoothing weights: (-3, 12, 17, 12, -3) / 35
        let w = savgol_weights(2, 3, 0.0).unwrap();
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0];
        for (a, b) in w.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, b / 35.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_savgol_preserves_cubic() {
        let data: Vec<f64> = (0..60)
            .map(|i| {
                let x = i as f64 * 0.1;
                0.5 * x * x * x - x * x + 2.0 * x - 1.0
            })
            .collect();
        let out = savgol_filter(&data, 11, 3).unwrap();
        for (a, b) in out.iter().zip(data.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_savgol_rejects_bad_window() {
        assert!(savgol_filter(&[1.0; 10], 4, 2).is_err());
        assert!(savgol_filter(&[1.0; 10], 11, 2).is_err());
        assert!(savgol_weights(1, 3, 0.0).is_err());
    }

    #[test]
    fn test_smoothing_window_bounds() {
        assert_eq!(smoothing_window(50, 10_000.0, 51, 3), None);
        // len / 10 = 100, cycle at 1 kHz = 100 → capped by max_window
        assert_eq!(smoothing_window(1000, 100_000.0, 51, 3), Some(51));
        // cycle at 1 kHz = 10 samples → 9
        assert_eq!(smoothing_window(1000, 10_000.0, 51, 3), Some(9));
        // never narrower than poly_order + 2
        assert_eq!(smoothing_window(60, 2_000.0, 51, 3), Some(5));
    }

    #[test]
    fn test_detrend_removes_ramp() {
        let data: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();
        for v in detrend(&data) {
            assert!(v.abs() < 1e-9);
        }
    }

    #[test]
    fn test_preprocess_is_centered_unit_variance() {
        let config = AnalysisConfig::default();
        let signal: Vec<f64> = (0..1000)
            .map(|i| 2.0 + (2.0 * std::f64::consts::PI * 120.0 * i as f64 / 10_000.0).sin())
            .collect();
        let out = preprocess(&signal, 10_000.0, &config);

        assert_eq!(out.len(), signal.len());
        // Centered before smoothing, so only the filter edges move the mean.
        assert!(stats::mean(&out).unwrap().abs() < 1e-2);
        assert_relative_eq!(stats::std_dev(&out).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_preprocess_flat_signal_is_zero() {
        let config = AnalysisConfig::default();
        let out = preprocess(&[4.2; 100], 1000.0, &config);
        assert!(out.iter().all(|&x| x == 0.0));
    }
}
