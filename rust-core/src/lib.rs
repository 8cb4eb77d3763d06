//! Live Spectrogram - Real-Time Spectrum Analysis Core
//!
//! Captures a live audio stream, turns it into averaged STFT spectra with
//! calibration and A-weighting, and keeps a color-mapped rolling spectrogram
//! under linear or logarithmic frequency axes. Python bindings are available
//! with the `python` feature.

// Suppress PyO3 non-local impl warnings (harmless macro-generated code)
#![cfg_attr(feature = "python", allow(non_local_definitions))]

pub mod audio;
pub mod axis;
pub mod config;
pub mod error;
pub mod spectrogram;
pub mod spectrum;

#[cfg(feature = "python")]
pub mod python_bindings;

pub use audio::{AnalyzerSession, ResultsMailbox, SpectrumListener};
pub use axis::{AxisMapping, AxisScale};
pub use config::{AnalysisParameters, SignalSource};
pub use error::{AnalyzerError, Result};
pub use spectrogram::{SharedSpectrogram, Spectrogram};
pub use spectrum::{Peak, Stft, WindowType};
