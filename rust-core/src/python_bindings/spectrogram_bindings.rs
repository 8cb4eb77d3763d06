//! Python bindings for the spectrogram engine

use super::to_py_err;
use crate::axis::{AxisMapping, AxisScale};
use crate::spectrogram::{LogAxisMode, Palette, SharedSpectrogram, Spectrogram, TimeAxisMode};
use ndarray::Array2;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn axis_from(n_pixels: f64, lower: f64, upper: f64, log: bool) -> PyResult<AxisMapping> {
    let scale = if log { AxisScale::Log } else { AxisScale::Linear };
    AxisMapping::new(n_pixels, lower, upper, scale).map_err(to_py_err)
}

/// Spectrogram shared with a capture session
#[pyclass(name = "Spectrogram")]
pub struct PySpectrogram {
    shared: SharedSpectrogram,
}

impl PySpectrogram {
    pub(crate) fn shared(&self) -> SharedSpectrogram {
        self.shared.clone()
    }
}

#[pymethods]
impl PySpectrogram {
    /// Create a spectrogram
    ///
    /// Args:
    ///     n_freq: FFT length / 2
    ///     n_time: Rows of history
    ///     n_pixels: Width of the frequency axis on screen
    ///     lower, upper: Frequency axis bounds in Hz
    ///     log: Logarithmic frequency axis
    #[new]
    #[pyo3(signature = (n_freq, n_time, n_pixels=1000.0, lower=20.0, upper=8000.0, log=true))]
    fn new(n_freq: usize, n_time: usize, n_pixels: f64, lower: f64, upper: f64, log: bool) -> PyResult<Self> {
        let axis = axis_from(n_pixels, lower, upper, log)?;
        let spectrogram = Spectrogram::new(n_freq, n_time, axis).map_err(to_py_err)?;
        Ok(Self {
            shared: SharedSpectrogram::new(spectrogram),
        })
    }

    /// Append one dB spectrum of n_freq + 1 bins
    fn fill(&self, spectrum_db: PyReadonlyArray1<f64>) -> PyResult<()> {
        self.shared.fill(spectrum_db.as_slice()?).map_err(to_py_err)
    }

    /// Current raster as ARGB
    ///
    /// Returns:
    ///     Tuple of (pixels[height, width], cursor_row or None, mirrored)
    fn draw<'py>(&self, py: Python<'py>) -> PyResult<(&'py PyArray2<u32>, Option<usize>, bool)> {
        let (pixels, cursor_row, mirrored) = self.shared.with_view(|view| {
            let pixels = Array2::from_shape_vec((view.height, view.width), view.pixels.to_vec());
            (pixels, view.cursor_row, view.mirrored)
        });
        let pixels = pixels.map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok((pixels.into_pyarray(py), cursor_row, mirrored))
    }

    /// Palette by name: hot, gray, blackbody, magma, inferno, viridis
    fn set_palette(&self, name: &str) -> PyResult<()> {
        let palette = Palette::from_name(name)
            .ok_or_else(|| PyValueError::new_err(format!("Unknown palette '{}'", name)))?;
        self.shared.lock().set_palette(palette);
        Ok(())
    }

    fn set_db_range(&self, db_lower: f64, db_upper: f64) -> PyResult<()> {
        self.shared
            .lock()
            .set_db_range(db_lower, db_upper)
            .map_err(to_py_err)
    }

    fn set_smooth(&self, smooth: bool) {
        self.shared.lock().set_smooth(smooth);
    }

    /// True for overwrite with a cursor, False for scrolling
    fn set_overwrite(&self, overwrite: bool) {
        let mode = if overwrite {
            TimeAxisMode::Overwrite
        } else {
            TimeAxisMode::Shift
        };
        self.shared.lock().set_time_mode(mode);
    }

    /// Draw the log axis from fixed octave segments instead of rebuilding
    fn set_segmented(&self, segmented: bool) {
        let mode = if segmented {
            LogAxisMode::Segmented
        } else {
            LogAxisMode::FullRebuild
        };
        self.shared.lock().set_log_axis_mode(mode);
    }

    #[pyo3(signature = (n_pixels, lower, upper, log=true))]
    fn update_axis(&self, n_pixels: f64, lower: f64, upper: f64, log: bool) -> PyResult<()> {
        let axis = axis_from(n_pixels, lower, upper, log)?;
        self.shared.lock().update_axis(axis);
        Ok(())
    }

    fn update_zoom(&self, zoom: f64, shift: f64) -> PyResult<()> {
        let mut spectrogram = self.shared.lock();
        let mut axis = spectrogram.axis().clone();
        axis.set_zoom_shift(zoom, shift).map_err(to_py_err)?;
        spectrogram.update_zoom(axis);
        Ok(())
    }

    fn save_state(&self) -> PyResult<String> {
        self.shared.lock().save_state().map_err(to_py_err)
    }

    fn restore_state(&self, json: &str) -> PyResult<()> {
        self.shared.lock().restore_state(json).map_err(to_py_err)
    }
}
