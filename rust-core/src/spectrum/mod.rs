//! Spectral analysis with FFT

pub mod bessel;
pub mod calibration;
pub mod fft;
pub mod stft;
pub mod weighting;
pub mod windows;

pub use calibration::Calibration;
pub use fft::FftEngine;
pub use stft::{Peak, Stft};
pub use windows::{Window, WindowType};
