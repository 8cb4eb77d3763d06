//! Crate-wide error type
//!
//! Configuration problems are reported synchronously when a session, STFT or
//! axis is built. Device problems surface through `AudioError`.

use crate::audio::input::AudioError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("FFT length must be a power of two >= 2 (got {0})")]
    InvalidFftLength(usize),

    #[error("Hop length must be positive (got {0})")]
    InvalidHopLength(usize),

    #[error("Averaging count must be at least 1")]
    InvalidAverageCount,

    #[error("Sample rate must be positive (got {0})")]
    InvalidSampleRate(u32),

    #[error("Calibration curve is malformed: {0}")]
    InvalidCalibration(String),

    #[error("Degenerate axis bounds [{lower}, {upper}]")]
    DegenerateAxis { lower: f64, upper: f64 },

    #[error("Invalid zoom {zoom} or shift {shift}")]
    InvalidZoom { zoom: f64, shift: f64 },

    #[error("Spectrogram needs at least one bin and one row (got {n_freq} x {n_time})")]
    InvalidShape { n_freq: usize, n_time: usize },

    #[error("Spectrum row has {got} bins, expected {expected}")]
    RowLength { expected: usize, got: usize },

    #[error("Saved spectrogram state is inconsistent: {0}")]
    InvalidState(String),

    #[error("FFT processing failed: {0}")]
    Fft(String),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("State serialization failed: {0}")]
    State(#[from] serde_json::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, AnalyzerError>;
