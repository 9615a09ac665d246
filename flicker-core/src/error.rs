//! Analysis error types

use thiserror::Error;

/// Errors raised while analyzing a waveform.
///
/// Only `InvalidWaveform` and `InsufficientData` ever reach the caller of
/// [`crate::analyze`]. `Numerical` is produced inside the preprocessor and the
/// frequency estimators and is resolved to a fallback at that boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlickerError {
    /// Too few usable samples, or a degenerate sample interval
    #[error("invalid waveform: {0}")]
    InvalidWaveform(String),

    /// A period slice longer than the waveform was requested
    #[error("insufficient data: requested {requested} samples but only {available} are available")]
    InsufficientData { requested: usize, available: usize },

    /// A numerical step failed (singular fit, non-finite output, empty input)
    #[error("numerical failure: {0}")]
    Numerical(String),
}

/// Result type for analysis operations
pub type FlickerResult<T> = Result<T, FlickerError>;
