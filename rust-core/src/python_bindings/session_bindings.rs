//! Python bindings for the capture session

use super::spectrogram_bindings::PySpectrogram;
use super::to_py_err;
use crate::audio::{list_input_devices, AnalyzerSession, ResultsMailbox};
use crate::config::{AnalysisParameters, SignalSource};
use crate::spectrum::WindowType;
use numpy::PyArray1;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

fn parse_source(source: &str, device: Option<String>) -> PyResult<SignalSource> {
    match source {
        "device" => Ok(SignalSource::Device { name: device }),
        "sine" => Ok(SignalSource::test_sine()),
        "dual_sine" => Ok(SignalSource::test_dual_sine()),
        "noise" => Ok(SignalSource::WhiteNoise),
        other => Err(PyValueError::new_err(format!("Unknown source '{}'", other))),
    }
}

/// Capture session exposed to Python
///
/// All capture and analysis happens on a Rust thread; Python polls results.
#[pyclass(name = "AnalyzerSession", unsendable)]
pub struct PyAnalyzerSession {
    session: AnalyzerSession,
    mailbox: Arc<ResultsMailbox>,
}

#[pymethods]
impl PyAnalyzerSession {
    /// Create a stopped session
    ///
    /// Args:
    ///     sample_rate: Sample rate in Hz
    ///     fft_len: FFT length (power of 2)
    ///     hop_len: Hop between frames in samples
    ///     window: Window name, e.g. "Hanning" or "Kaiser a=3"
    ///     n_average: Frames averaged per published spectrum
    ///     source: "device", "sine", "dual_sine" or "noise"
    ///     device: Input device name, default device if None
    ///     recording_dir: Directory for WAV recordings
    #[new]
    #[pyo3(signature = (
        sample_rate=16000, fft_len=2048, hop_len=1024, window="Hanning",
        n_average=2, source="device", device=None, recording_dir="recordings"
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        sample_rate: u32,
        fft_len: usize,
        hop_len: usize,
        window: &str,
        n_average: usize,
        source: &str,
        device: Option<String>,
        recording_dir: &str,
    ) -> PyResult<Self> {
        let params = AnalysisParameters {
            sample_rate,
            fft_len,
            hop_len,
            window: WindowType::from_name(window),
            n_average,
            source: parse_source(source, device)?,
            recording_dir: PathBuf::from(recording_dir),
            ..Default::default()
        };
        let mailbox = Arc::new(ResultsMailbox::new());
        let session = AnalyzerSession::new(params, mailbox.clone()).map_err(to_py_err)?;

        Ok(Self { session, mailbox })
    }

    /// Start capture and analysis
    fn start(&mut self) -> PyResult<()> {
        self.session.start().map_err(to_py_err)
    }

    /// Stop capture; a running recording is saved
    fn stop(&mut self) {
        self.session.stop();
    }

    fn pause(&self, paused: bool) {
        self.session.pause(paused);
    }

    fn set_a_weighting(&self, enabled: bool) {
        self.session.set_a_weighting(enabled);
    }

    fn set_recording(&self, enabled: bool) {
        self.session.set_recording(enabled);
    }

    /// Feed every published spectrum into `spectrogram`
    fn attach_spectrogram(&self, spectrogram: PyRef<PySpectrogram>) {
        self.session.attach_spectrogram(spectrogram.shared());
    }

    fn is_running(&self) -> bool {
        self.session.is_running()
    }

    fn num_bins(&self) -> usize {
        self.session.params().fft_len / 2 + 1
    }

    fn bin_width(&self) -> f64 {
        self.session.params().bin_width()
    }

    /// Get latest analysis results
    ///
    /// Returns:
    ///     Dictionary with keys: 'spectrum_db', 'peak_freq', 'peak_db', 'rms',
    ///     'rms_from_ft', 'sequence', or None if no new data
    fn get_results(&self, py: Python<'_>) -> PyResult<Option<PyObject>> {
        if let Some(error) = self.mailbox.take_error() {
            return Err(PyRuntimeError::new_err(error));
        }

        self.mailbox
            .take_results()
            .map(|results| {
                let dict = pyo3::types::PyDict::new(py);
                dict.set_item("spectrum_db", PyArray1::from_vec(py, results.spectrum_db))?;
                if let Some(peak) = results.peak {
                    dict.set_item("peak_freq", peak.freq)?;
                    dict.set_item("peak_db", peak.db)?;
                }
                dict.set_item("rms", results.rms)?;
                dict.set_item("rms_from_ft", results.rms_from_ft)?;
                dict.set_item("sequence", results.sequence)?;
                Ok(dict.into())
            })
            .transpose()
    }

    /// Number of overruns detected since the session was created
    fn overrun_count(&self) -> u64 {
        self.mailbox.overrun_count()
    }

    /// (seconds written, seconds left) of the current recording
    fn recording_progress(&self) -> Option<(f64, f64)> {
        self.mailbox.recording_progress()
    }

    /// Path of the last saved recording
    fn saved_wav(&self) -> Option<String> {
        self.mailbox
            .saved_wav()
            .map(|p| p.to_string_lossy().into_owned())
    }
}

/// List available audio input devices
#[pyfunction]
pub fn list_devices() -> PyResult<Vec<String>> {
    list_input_devices()
        .map(|devices| devices.into_iter().map(|d| d.name).collect())
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))
}
