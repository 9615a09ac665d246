//! # Fast Fourier Transform (FFT) Module
//!
//! Spectral building blocks shared by the frequency estimators and the
//! spectrum reporter. Everything here is a thin layer over RustFFT.
//!
//! ## Features
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal
//! - Zero-padded forward transforms with a 2048-point floor
//! - FFT-based autocorrelation (O(N log N) instead of O(N²))
//! - Analytic signal via the frequency-domain Hilbert transform

use rustfft::{FftPlanner, num_complex::Complex};

/// Smallest transform length used for spectral peak picking.
///
/// Short records are zero-padded up to this size to get a usable bin spacing.
pub const MIN_FFT_SIZE: usize = 2048;

/// Removes the DC offset from a signal by making its average value zero.
///
/// # Arguments
/// * `signal` - Signal to process (modified in-place)
pub fn remove_dc_offset(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f64>() / len as f64;
    for sample in signal.iter_mut() {
        *sample -= avg;
    }
}

/// Applies a Hann window to the input buffer to reduce spectral leakage.
///
/// # Arguments
/// * `buffer` - Buffer to window (modified in-place)
pub fn apply_hann_window(buffer: &mut [f64]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f64;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Transform length for spectral peak picking: the next power of two, at
/// least [`MIN_FFT_SIZE`].
pub fn padded_len(n: usize) -> usize {
    n.next_power_of_two().max(MIN_FFT_SIZE)
}

/// Forward FFT of `signal` zero-padded (or truncated) to `fft_len` points.
pub fn forward(signal: &[f64], fft_len: usize) -> Vec<Complex<f64>> {
    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .take(fft_len)
        .map(|&sample| Complex { re: sample, im: 0.0 })
        .collect();
    buffer.resize(fft_len, Complex { re: 0.0, im: 0.0 });

    if fft_len == 0 {
        return buffer;
    }
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_len);
    fft.process(&mut buffer);
    buffer
}

/// Inverse FFT, normalized by the length so that `inverse(forward(x)) == x`.
pub fn inverse(spectrum: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let n = spectrum.len();
    let mut buffer = spectrum.to_vec();
    if n == 0 {
        return buffer;
    }
    let mut planner = FftPlanner::new();
    let ifft = planner.plan_fft_inverse(n);
    ifft.process(&mut buffer);
    let scale = 1.0 / n as f64;
    for c in buffer.iter_mut() {
        *c *= scale;
    }
    buffer
}

/// DC-removed, Hann-windowed, zero-padded spectrum of `signal`.
///
/// Returns the complex spectrum together with the transform length used.
pub fn windowed_spectrum(signal: &[f64]) -> (Vec<Complex<f64>>, usize) {
    let mut processed_signal = signal.to_vec();
    remove_dc_offset(&mut processed_signal);
    apply_hann_window(&mut processed_signal);

    let fft_len = padded_len(signal.len());
    (forward(&processed_signal, fft_len), fft_len)
}

/// Magnitudes of the non-negative frequency bins (`0..=len/2`).
pub fn spectrum_to_magnitudes(spectrum: &[Complex<f64>]) -> Vec<f64> {
    spectrum
        .iter()
        .take(spectrum.len() / 2 + 1)
        .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
        .collect()
}

/// Centre frequency of `bin` for a transform of `fft_len` points.
pub fn bin_frequency(bin: f64, fft_len: usize, sample_rate: f64) -> f64 {
    bin * sample_rate / fft_len as f64
}

/// Linear autocorrelation for lags `0..signal.len()`.
///
/// Equivalent to the non-negative half of a full direct correlation, computed
/// through a zero-padded power spectrum.
pub fn autocorrelate(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let fft_len = (2 * n).next_power_of_two();
    let spectrum = forward(signal, fft_len);
    let power: Vec<Complex<f64>> = spectrum
        .iter()
        .map(|c| Complex { re: c.norm_sqr(), im: 0.0 })
        .collect();
    inverse(&power).iter().take(n).map(|c| c.re).collect()
}

/// Analytic signal `x + j·H{x}` computed in the frequency domain.
///
/// Positive frequencies are doubled, negative ones zeroed; DC and (for even
/// lengths) Nyquist are kept as is.
pub fn analytic_signal(signal: &[f64]) -> Vec<Complex<f64>> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let mut spectrum = forward(signal, n);
    for (k, c) in spectrum.iter_mut().enumerate() {
        let gain = if k == 0 || (n % 2 == 0 && k == n / 2) {
            1.0
        } else if k < n.div_ceil(2) {
            2.0
        } else {
            0.0
        };
        *c *= gain;
    }
    inverse(&spectrum)
}
