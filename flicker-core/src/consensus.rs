//! # Consensus Module
//!
//! Reconciles the candidates proposed by the frequency estimators into one
//! fundamental frequency.
//!
//! ## Rules
//! - Secondary (envelope) candidates count only when a primary candidate lies
//!   within [`SECONDARY_AGREEMENT`] of them. A lone envelope candidate is not
//!   enough to report a frequency: the envelope locks onto any amplitude
//!   modulation, so without a primary method behind it the fallback is used
//! - A candidate within [`HARMONIC_TOLERANCE`] of 2×-6× a lower surviving
//!   candidate is a harmonic and is dropped
//! - The lowest survivor wins; with no candidates the configured fallback is
//!   returned and flagged

use tracing::debug;

use crate::frequency::FrequencyCandidate;

/// Relative tolerance when deciding that one candidate is a harmonic of another.
pub const HARMONIC_TOLERANCE: f64 = 0.10;

/// Relative agreement a primary candidate must show with a secondary one.
pub const SECONDARY_AGREEMENT: f64 = 0.10;

const HARMONIC_MULTIPLES: std::ops::RangeInclusive<u32> = 2..=6;

/// Outcome of [`select`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consensus {
    /// Fundamental frequency in Hz
    pub frequency: f64,
    /// True when no candidate was usable
    pub fallback_used: bool,
}

/// Candidate frequencies that take part in the vote.
///
/// Primary candidates are always admitted. A secondary candidate is admitted
/// only when some primary candidate is within [`SECONDARY_AGREEMENT`] of it.
pub fn admit(candidates: &[FrequencyCandidate]) -> Vec<f64> {
    let primaries: Vec<f64> = candidates
        .iter()
        .filter(|c| c.method.is_primary())
        .map(|c| c.value)
        .collect();

    candidates
        .iter()
        .filter(|c| {
            if c.method.is_primary() {
                return true;
            }
            let corroborated = primaries
                .iter()
                .any(|&p| (p - c.value).abs() <= SECONDARY_AGREEMENT * c.value);
            if !corroborated {
                debug!("[FREQ] Ignoring uncorroborated {} candidate {:.3} Hz", c.method, c.value);
            }
            corroborated
        })
        .map(|c| c.value)
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect()
}

/// Removes values that are harmonics of a lower surviving value.
///
/// # Returns
/// * Surviving values in ascending order
pub fn suppress_harmonics(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut survivors: Vec<f64> = Vec::with_capacity(sorted.len());
    for value in sorted {
        let is_harmonic = survivors.iter().any(|&base| {
            HARMONIC_MULTIPLES.clone().any(|k| {
                let expected = base * k as f64;
                (value - expected).abs() <= HARMONIC_TOLERANCE * expected
            })
        });
        if is_harmonic {
            debug!("[FREQ] Dropping {:.3} Hz as a harmonic", value);
        } else {
            survivors.push(value);
        }
    }
    survivors
}

/// Resolves `candidates` into a single frequency.
///
/// # Arguments
/// * `candidates` - Candidates from the estimators, in any order
/// * `fallback_hz` - Frequency returned when nothing is usable
pub fn select(candidates: &[FrequencyCandidate], fallback_hz: f64) -> Consensus {
    let admitted = admit(candidates);
    if admitted.is_empty() {
        return Consensus {
            frequency: fallback_hz,
            fallback_used: true,
        };
    }

    let survivors = suppress_harmonics(&admitted);
    let frequency = match survivors.first() {
        Some(&f) => f,
        None => admitted.iter().cloned().fold(f64::INFINITY, f64::min),
    };

    Consensus {
        frequency,
        fallback_used: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::EstimationMethod;

    fn candidate(value: f64, method: EstimationMethod) -> FrequencyCandidate {
        FrequencyCandidate { value, method }
    }

    #[test]
    fn test_empty_uses_fallback() {
        let result = select(&[], 120.0);
        assert_eq!(result.frequency, 120.0);
        assert!(result.fallback_used);
    }

    #[test]
    fn test_harmonic_is_suppressed() {
        let candidates = [
            candidate(240.5, EstimationMethod::Fft),
            candidate(120.2, EstimationMethod::Autocorrelation),
            candidate(119.8, EstimationMethod::ZeroCrossing),
        ];
        let result = select(&candidates, 100.0);
        assert!(!result.fallback_used);
        assert_eq!(result.frequency, 119.8);
        assert_eq!(suppress_harmonics(&[240.5, 120.2, 119.8]), vec![119.8, 120.2]);
    }

    #[test]
    fn test_higher_multiples_are_harmonics() {
        assert_eq!(suppress_harmonics(&[600.0, 100.0, 410.0]), vec![100.0]);
        // 2.5× is not a harmonic
        assert_eq!(suppress_harmonics(&[250.0, 100.0]), vec![100.0, 250.0]);
    }

    #[test]
    fn test_uncorroborated_envelope_is_ignored() {
        let candidates = [
            candidate(120.0, EstimationMethod::Fft),
            candidate(60.0, EstimationMethod::Envelope),
        ];
        assert_eq!(select(&candidates, 100.0).frequency, 120.0);
    }

    #[test]
    fn test_corroborated_envelope_votes() {
        let candidates = [
            candidate(120.0, EstimationMethod::Fft),
            candidate(118.0, EstimationMethod::Envelope),
        ];
        assert_eq!(admit(&candidates), vec![120.0, 118.0]);
        assert_eq!(select(&candidates, 100.0).frequency, 118.0);
    }

    #[test]
    fn test_envelope_alone_is_not_enough() {
        let candidates = [candidate(120.0, EstimationMethod::Envelope)];
        let result = select(&candidates, 100.0);
        assert!(result.fallback_used);
        assert_eq!(result.frequency, 100.0);
    }
}
