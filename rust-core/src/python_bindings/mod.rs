//! PyO3 bindings for Python integration

use crate::error::AnalyzerError;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

mod session_bindings;
mod spectrogram_bindings;
mod spectrum_bindings;

/// Configuration errors become `ValueError`, everything else `RuntimeError`
pub(crate) fn to_py_err(e: AnalyzerError) -> PyErr {
    match e {
        AnalyzerError::Audio(_)
        | AnalyzerError::Io(_)
        | AnalyzerError::Wav(_)
        | AnalyzerError::Fft(_) => PyRuntimeError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

/// Python module definition
#[pymodule]
fn live_spectrogram(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<session_bindings::PyAnalyzerSession>()?;
    m.add_class::<spectrum_bindings::PyStft>()?;
    m.add_class::<spectrogram_bindings::PySpectrogram>()?;
    m.add_function(wrap_pyfunction!(session_bindings::list_devices, m)?)?;

    Ok(())
}
