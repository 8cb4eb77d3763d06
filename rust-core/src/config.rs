//! Analysis session configuration
//!
//! `AnalysisParameters` is fixed for the lifetime of one capture session.
//! Changing the sample rate, FFT length or source means tearing the session
//! down and starting a new one.

use crate::error::{AnalyzerError, Result};
use crate::spectrum::calibration::Calibration;
use crate::spectrum::windows::WindowType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound for a single capture read, in samples
pub const MAX_READ_CHUNK: usize = 2048;

/// Full-scale value of a 16-bit sample
pub const SAMPLE_VALUE_MAX: f64 = 32767.0;

/// Where the capture loop takes its samples from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalSource {
    /// Input device, `None` for the host default
    Device { name: Option<String> },

    /// One sine wave, level in dB relative to full scale
    Sine { freq: f64, db: f64 },

    /// Two superposed sine waves
    DualSine {
        freq1: f64,
        db1: f64,
        freq2: f64,
        db2: f64,
    },

    /// Full-scale uniform white noise
    WhiteNoise,
}

impl Default for SignalSource {
    fn default() -> Self {
        SignalSource::Device { name: None }
    }
}

impl SignalSource {
    /// Test tone at 625 Hz, -6 dBFS
    pub fn test_sine() -> Self {
        SignalSource::Sine {
            freq: 625.0,
            db: -6.0,
        }
    }

    /// Test tones at 625 Hz (-6 dBFS) and 1875 Hz (-12 dBFS)
    pub fn test_dual_sine() -> Self {
        SignalSource::DualSine {
            freq1: 625.0,
            db1: -6.0,
            freq2: 1875.0,
            db2: -12.0,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        !matches!(self, SignalSource::Device { .. })
    }
}

/// Parameters of one analysis session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisParameters {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// FFT length N (power of two)
    pub fft_len: usize,

    /// Hop length H; H < N overlaps frames, H > N skips samples
    pub hop_len: usize,

    /// Window function
    pub window: WindowType,

    /// Frames averaged into each published spectrum (K)
    pub n_average: usize,

    /// Apply A-weighting to published spectra
    pub a_weighting: bool,

    /// Optional microphone calibration
    pub calibration: Option<Calibration>,

    /// Sample source
    pub source: SignalSource,

    /// Length of the spectrogram history in seconds
    pub spectrogram_duration: f64,

    /// Directory for WAV recordings
    pub recording_dir: PathBuf,
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            fft_len: 2048,
            hop_len: 1024,
            window: WindowType::Hanning,
            n_average: 2,
            a_weighting: false,
            calibration: None,
            source: SignalSource::default(),
            spectrogram_duration: 4.0,
            recording_dir: PathBuf::from("recordings"),
        }
    }
}

impl AnalysisParameters {
    /// Check all structural parameters
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AnalyzerError::InvalidSampleRate(self.sample_rate));
        }
        if self.fft_len < 2 || !self.fft_len.is_power_of_two() {
            return Err(AnalyzerError::InvalidFftLength(self.fft_len));
        }
        if self.hop_len == 0 {
            return Err(AnalyzerError::InvalidHopLength(self.hop_len));
        }
        if self.n_average == 0 {
            return Err(AnalyzerError::InvalidAverageCount);
        }
        if let Some(calib) = &self.calibration {
            calib.validate()?;
        }
        Ok(())
    }

    /// Overlap ratio, `1 - H/N` (negative when frames are skipped)
    pub fn overlap(&self) -> f64 {
        1.0 - self.hop_len as f64 / self.fft_len as f64
    }

    /// Frequency spacing of analysis bins in Hz
    pub fn bin_width(&self) -> f64 {
        self.sample_rate as f64 / self.fft_len as f64
    }

    /// Samples read per capture iteration
    pub fn read_chunk_size(&self) -> usize {
        self.hop_len.min(MAX_READ_CHUNK)
    }

    /// Capture buffer size in samples, about one second of audio
    ///
    /// Rounded up to a whole multiple of twice the larger of the read
    /// chunk and half an FFT frame.
    pub fn buffer_sample_size(&self) -> usize {
        let block = self.read_chunk_size().max(self.fft_len / 2) * 2;
        (self.sample_rate as usize).div_ceil(block) * block
    }

    /// Rows of spectrogram history covering `spectrogram_duration`
    pub fn spectrogram_rows(&self) -> usize {
        let row_seconds = self.hop_len as f64 / self.sample_rate as f64;
        ((self.spectrogram_duration / row_seconds).ceil() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let params = AnalysisParameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.overlap(), 0.5);
        assert_eq!(params.read_chunk_size(), 1024);
    }

    #[test]
    fn test_validation_errors() {
        let mut params = AnalysisParameters::default();
        params.fft_len = 1000;
        assert!(matches!(params.validate(), Err(AnalyzerError::InvalidFftLength(1000))));

        let mut params = AnalysisParameters::default();
        params.hop_len = 0;
        assert!(matches!(params.validate(), Err(AnalyzerError::InvalidHopLength(0))));

        let mut params = AnalysisParameters::default();
        params.n_average = 0;
        assert!(matches!(params.validate(), Err(AnalyzerError::InvalidAverageCount)));

        let mut params = AnalysisParameters::default();
        params.sample_rate = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_malformed_calibration_rejected() {
        let json = serde_json::to_string(&AnalysisParameters::default()).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["calibration"] = serde_json::json!({
            "name": "broken",
            "freq": [100.0, 200.0],
            "gain_db": [1.0],
        });
        assert!(serde_json::from_value::<AnalysisParameters>(value.clone()).is_err());

        value["calibration"]["freq"] = serde_json::json!([]);
        value["calibration"]["gain_db"] = serde_json::json!([]);
        assert!(serde_json::from_value::<AnalysisParameters>(value.clone()).is_err());

        value["calibration"]["freq"] = serde_json::json!([100.0]);
        value["calibration"]["gain_db"] = serde_json::json!([3.0]);
        let params: AnalysisParameters = serde_json::from_value(value).unwrap();
        assert!(params.validate().is_ok());
        assert_eq!(params.calibration.unwrap().gain_db(), &[3.0]);
    }

    #[test]
    fn test_hop_longer_than_frame_is_allowed() {
        let params = AnalysisParameters {
            fft_len: 256,
            hop_len: 768,
            ..Default::default()
        };
        assert!(params.validate().is_ok());
        assert_eq!(params.overlap(), -2.0);
    }

    #[test]
    fn test_buffer_sizes() {
        let params = AnalysisParameters {
            sample_rate: 8000,
            fft_len: 1024,
            hop_len: 512,
            ..Default::default()
        };
        // block = max(512, 512) * 2 = 1024, ceil(8000/1024) = 8
        assert_eq!(params.buffer_sample_size(), 8192);

        let params = AnalysisParameters {
            hop_len: 4096,
            fft_len: 8192,
            ..Default::default()
        };
        assert_eq!(params.read_chunk_size(), MAX_READ_CHUNK);
    }

    #[test]
    fn test_spectrogram_rows() {
        // 4 s at 1024/16000 s per row
        assert_eq!(AnalysisParameters::default().spectrogram_rows(), 63);
    }

    #[test]
    fn test_serde_round_trip() {
        let params = AnalysisParameters {
            source: SignalSource::test_dual_sine(),
            window: WindowType::Kaiser { alpha: 3.0 },
            ..Default::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: AnalysisParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source, params.source);
        assert_eq!(back.window, params.window);
        assert_eq!(back.fft_len, params.fft_len);
    }
}
