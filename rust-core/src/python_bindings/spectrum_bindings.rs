//! Python bindings for the STFT engine

use super::to_py_err;
use crate::config::AnalysisParameters;
use crate::spectrum::{Calibration, Stft, WindowType};
use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::prelude::*;

/// STFT engine exposed to Python, for off-thread use on arrays
#[pyclass(name = "Stft")]
pub struct PyStft {
    stft: Stft,
}

#[pymethods]
impl PyStft {
    /// Create a new STFT engine
    ///
    /// Args:
    ///     sample_rate: Sample rate in Hz
    ///     fft_len: FFT length (power of 2)
    ///     hop_len: Hop between frames in samples
    ///     window: Window name
    ///     a_weighting: Apply A-weighting to results
    ///     calibration: Path of a microphone calibration file
    #[new]
    #[pyo3(signature = (sample_rate=16000, fft_len=2048, hop_len=1024, window="Hanning", a_weighting=false, calibration=None))]
    fn new(
        sample_rate: u32,
        fft_len: usize,
        hop_len: usize,
        window: &str,
        a_weighting: bool,
        calibration: Option<&str>,
    ) -> PyResult<Self> {
        let calibration = calibration
            .map(Calibration::load)
            .transpose()
            .map_err(to_py_err)?;
        let params = AnalysisParameters {
            sample_rate,
            fft_len,
            hop_len,
            window: WindowType::from_name(window),
            a_weighting,
            calibration,
            ..Default::default()
        };

        Ok(Self {
            stft: Stft::new(&params).map_err(to_py_err)?,
        })
    }

    /// Feed normalized samples in [-1, 1]
    fn feed(&mut self, signal: PyReadonlyArray1<f64>) -> PyResult<()> {
        let samples = signal.as_slice()?;
        self.stft.feed_normalized(samples).map_err(to_py_err)
    }

    /// Feed raw 16-bit PCM
    fn feed_pcm(&mut self, signal: PyReadonlyArray1<i16>) -> PyResult<()> {
        let samples = signal.as_slice()?;
        self.stft.feed(samples).map_err(to_py_err)
    }

    /// Frames accumulated since the last spectrum
    fn frames_ready(&self) -> usize {
        self.stft.frames_ready()
    }

    /// Averaged power spectrum, N/2 + 1 bins
    fn spectrum<'py>(&mut self, py: Python<'py>) -> &'py PyArray1<f64> {
        PyArray1::from_slice(py, self.stft.spectrum())
    }

    /// Averaged spectrum in dB
    fn spectrum_db<'py>(&mut self, py: Python<'py>) -> &'py PyArray1<f64> {
        PyArray1::from_slice(py, self.stft.spectrum_db())
    }

    /// (frequency in Hz, level in dB) of the strongest component
    fn peak(&mut self) -> (f64, f64) {
        let peak = self.stft.calculate_peak();
        (peak.freq, peak.db)
    }

    fn rms(&mut self) -> f64 {
        self.stft.rms()
    }

    fn rms_from_ft(&mut self) -> f64 {
        self.stft.rms_from_ft()
    }

    fn set_a_weighting(&mut self, enabled: bool) {
        self.stft.set_a_weighting(enabled);
    }

    fn clear(&mut self) {
        self.stft.clear();
    }

    fn num_bins(&self) -> usize {
        self.stft.num_bins()
    }

    fn bin_width(&self) -> f64 {
        self.stft.bin_width()
    }
}
