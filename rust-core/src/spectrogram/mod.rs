//! Spectrogram engine
//!
//! A `Spectrogram` owns the quantized history of published spectra and the
//! rasters derived from it: one for a linear frequency axis and one for a log
//! axis. The history is the only source of truth; every raster can be rebuilt
//! from it after a palette, range or axis change.

pub mod history;
pub mod linear;
pub mod log_rebuild;
pub mod log_segment;
pub mod palette;
pub mod raster;
pub mod state;

pub use history::SpectrogramHistory;
pub use palette::{ColorScale, Palette};
pub use raster::{RasterView, SegmentPlacement, TimeAxisMode};
pub use state::SpectrogramState;

use crate::axis::{AxisMapping, AxisScale};
use crate::config::AnalysisParameters;
use crate::error::{AnalyzerError, Result};
use linear::LinearRaster;
use log_rebuild::FullRebuild;
use log_segment::Segmented;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Strategy used for the log-frequency raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogAxisMode {
    /// Rebuild a viewport-sized raster whenever the axis changes
    #[default]
    FullRebuild,
    /// Fixed raster drawn as stretched octave segments
    Segmented,
}

/// A raster that maps bins onto a logarithmic frequency axis
pub trait LogRenderer: Send + fmt::Debug {
    fn mode(&self) -> LogAxisMode;

    /// Adopt a new shape and axis; content is cleared when the shape changes
    fn init(&mut self, n_freq: usize, n_time: usize, axis: &AxisMapping);

    /// Paint one spectrum of `n_freq + 1` dB values at the row pointer
    fn fill(&mut self, db: &[f64], colors: &ColorScale);

    /// Repaint every row from the history
    fn rebuild_from(&mut self, history: &SpectrogramHistory, axis: &AxisMapping, colors: &ColorScale);

    /// Axis bounds changed
    fn update_axis(&mut self, axis: &AxisMapping);

    /// Zoom or shift changed
    fn update_zoom(&mut self, axis: &AxisMapping);

    fn draw(
        &mut self,
        mode: TimeAxisMode,
        axis: &AxisMapping,
        history: &SpectrogramHistory,
        colors: &ColorScale,
        smooth: bool,
    ) -> RasterView<'_>;
}

fn make_renderer(mode: LogAxisMode, n_freq: usize, n_time: usize, axis: &AxisMapping) -> Box<dyn LogRenderer> {
    match mode {
        LogAxisMode::FullRebuild => Box::new(FullRebuild::new(n_freq, n_time, axis)),
        LogAxisMode::Segmented => Box::new(Segmented::new(n_freq, n_time, axis)),
    }
}

fn check_shape(n_freq: usize, n_time: usize) -> Result<()> {
    if n_freq == 0 || n_time == 0 {
        return Err(AnalyzerError::InvalidShape { n_freq, n_time });
    }
    Ok(())
}

#[derive(Debug)]
pub struct Spectrogram {
    history: SpectrogramHistory,
    linear: LinearRaster,
    log: Box<dyn LogRenderer>,
    axis: AxisMapping,
    colors: ColorScale,
    time_mode: TimeAxisMode,
    smooth: bool,
}

impl Spectrogram {
    /// Create an empty spectrogram
    ///
    /// # Arguments
    /// * `n_freq` - Bins per spectrum excluding DC (N/2)
    /// * `n_time` - Rows of history
    /// * `axis` - Frequency axis of the viewport
    pub fn new(n_freq: usize, n_time: usize, axis: AxisMapping) -> Result<Self> {
        check_shape(n_freq, n_time)?;
        Ok(Self {
            history: SpectrogramHistory::new(n_freq, n_time),
            linear: LinearRaster::new(n_freq, n_time),
            log: make_renderer(LogAxisMode::default(), n_freq, n_time, &axis),
            axis,
            colors: ColorScale::default(),
            time_mode: TimeAxisMode::default(),
            smooth: false,
        })
    }

    /// Spectrogram sized for an analysis session
    pub fn for_params(params: &AnalysisParameters, axis: AxisMapping) -> Result<Self> {
        Self::new(params.fft_len / 2, params.spectrogram_rows(), axis)
    }

    /// Reconfigure the shape and axis
    ///
    /// History is cleared only when `n_freq` or `n_time` differ from the
    /// current shape; otherwise the rasters are rebuilt from it.
    pub fn init(&mut self, n_freq: usize, n_time: usize, axis: AxisMapping) -> Result<()> {
        check_shape(n_freq, n_time)?;
        self.axis = axis;
        if n_freq != self.n_freq() || n_time != self.n_time() {
            log::debug!(
                "Spectrogram reshaped to {} bins x {} rows, history cleared",
                n_freq,
                n_time
            );
            self.history = SpectrogramHistory::new(n_freq, n_time);
            self.linear = LinearRaster::new(n_freq, n_time);
            self.log = make_renderer(self.log.mode(), n_freq, n_time, &self.axis);
        } else {
            self.rebuild_all();
        }
        Ok(())
    }

    /// Store one spectrum of `n_freq + 1` dB values and paint it
    pub fn fill(&mut self, spectrum_db: &[f64]) -> Result<()> {
        self.history.push(spectrum_db)?;
        self.linear.fill(spectrum_db, &self.colors);
        self.log.fill(spectrum_db, &self.colors);
        Ok(())
    }

    /// Frame for the current axis scale and time mode
    pub fn draw(&mut self) -> RasterView<'_> {
        match self.axis.scale() {
            AxisScale::Linear => {
                let mirrored = self.axis.is_reversed();
                self.linear
                    .raster_mut()
                    .view(self.time_mode, &[], mirrored, self.smooth)
            }
            AxisScale::Log => self.log.draw(
                self.time_mode,
                &self.axis,
                &self.history,
                &self.colors,
                self.smooth,
            ),
        }
    }

    /// Repaint both rasters from the history
    pub fn rebuild_all(&mut self) {
        self.linear.rebuild_from(&self.history, &self.colors);
        self.log.rebuild_from(&self.history, &self.axis, &self.colors);
    }

    pub fn set_palette(&mut self, palette: Palette) {
        if palette == self.colors.palette() {
            return;
        }
        self.colors = ColorScale::new(palette, self.colors.db_lower(), self.colors.db_upper());
        self.rebuild_all();
    }

    /// Set the dB range spanned by the palette
    pub fn set_db_range(&mut self, db_lower: f64, db_upper: f64) -> Result<()> {
        if !db_lower.is_finite() || !db_upper.is_finite() || db_lower >= db_upper {
            return Err(AnalyzerError::DegenerateAxis {
                lower: db_lower,
                upper: db_upper,
            });
        }
        self.colors = ColorScale::new(self.colors.palette(), db_lower, db_upper);
        self.rebuild_all();
        Ok(())
    }

    pub fn set_smooth(&mut self, smooth: bool) {
        self.smooth = smooth;
    }

    pub fn set_time_mode(&mut self, mode: TimeAxisMode) {
        self.time_mode = mode;
    }

    /// Switch log strategy; the new renderer is built from the history
    pub fn set_log_axis_mode(&mut self, mode: LogAxisMode) {
        if mode == self.log.mode() {
            return;
        }
        let mut renderer = make_renderer(mode, self.n_freq(), self.n_time(), &self.axis);
        renderer.rebuild_from(&self.history, &self.axis, &self.colors);
        self.log = renderer;
    }

    /// New axis bounds or scale
    pub fn update_axis(&mut self, axis: AxisMapping) {
        self.axis = axis;
        if self.axis.scale() == AxisScale::Log {
            self.log.update_axis(&self.axis);
        }
    }

    /// New zoom or shift on the same bounds
    pub fn update_zoom(&mut self, axis: AxisMapping) {
        self.axis = axis;
        self.log.update_zoom(&self.axis);
    }

    pub fn history(&self) -> &SpectrogramHistory {
        &self.history
    }

    pub fn axis(&self) -> &AxisMapping {
        &self.axis
    }

    pub fn colors(&self) -> &ColorScale {
        &self.colors
    }

    pub fn log_axis_mode(&self) -> LogAxisMode {
        self.log.mode()
    }

    pub fn time_mode(&self) -> TimeAxisMode {
        self.time_mode
    }

    pub fn smooth(&self) -> bool {
        self.smooth
    }

    pub fn n_freq(&self) -> usize {
        self.history.n_freq()
    }

    pub fn n_time(&self) -> usize {
        self.history.n_time()
    }

    pub fn state(&self) -> SpectrogramState {
        SpectrogramState {
            n_freq: self.n_freq(),
            n_time: self.n_time(),
            pointer: self.history.pointer(),
            levels: self.history.to_vec(),
            axis: self.axis.clone(),
            log_mode: self.log.mode(),
            time_mode: self.time_mode,
            palette: self.colors.palette(),
            smooth: self.smooth,
            db_lower: self.colors.db_lower(),
            db_upper: self.colors.db_upper(),
        }
    }

    /// Replace everything with a saved state and rebuild the rasters
    pub fn restore(&mut self, state: SpectrogramState) -> Result<()> {
        check_shape(state.n_freq, state.n_time)?;
        let axis = &state.axis;
        AxisMapping::new(axis.n_pixels(), axis.lower(), axis.upper(), axis.scale())?;
        let history = SpectrogramHistory::from_levels(state.n_freq, state.n_time, state.levels, state.pointer)?;

        self.history = history;
        self.axis = state.axis;
        self.colors = ColorScale::new(state.palette, state.db_lower, state.db_upper);
        self.time_mode = state.time_mode;
        self.smooth = state.smooth;
        self.linear = LinearRaster::new(state.n_freq, state.n_time);
        self.log = make_renderer(state.log_mode, state.n_freq, state.n_time, &self.axis);
        self.rebuild_all();
        Ok(())
    }

    pub fn save_state(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.state())?)
    }

    pub fn restore_state(&mut self, json: &str) -> Result<()> {
        let state: SpectrogramState = serde_json::from_str(json)?;
        self.restore(state)
    }

    pub fn save_state_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.save_state()?)?;
        Ok(())
    }

    pub fn restore_state_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let json = std::fs::read_to_string(path)?;
        self.restore_state(&json)
    }
}

/// Spectrogram shared between the capture thread and the renderer
///
/// Filling and drawing take the same lock, so a frame never shows a
/// half-written row.
#[derive(Debug, Clone)]
pub struct SharedSpectrogram(Arc<Mutex<Spectrogram>>);

impl SharedSpectrogram {
    pub fn new(spectrogram: Spectrogram) -> Self {
        Self(Arc::new(Mutex::new(spectrogram)))
    }

    /// Lock for reconfiguration; a poisoned lock is recovered
    pub fn lock(&self) -> MutexGuard<'_, Spectrogram> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fill(&self, spectrum_db: &[f64]) -> Result<()> {
        self.lock().fill(spectrum_db)
    }

    /// Run `f` on the current frame while holding the lock
    pub fn with_view<R>(&self, f: impl FnOnce(RasterView<'_>) -> R) -> R {
        let mut guard = self.lock();
        f(guard.draw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_axis() -> AxisMapping {
        AxisMapping::new(400.0, 0.0, 4000.0, AxisScale::Linear).unwrap()
    }

    fn log_axis() -> AxisMapping {
        AxisMapping::new(400.0, 20.0, 4000.0, AxisScale::Log).unwrap()
    }

    fn row(n_freq: usize, r: usize) -> Vec<f64> {
        (0..=n_freq).map(|i| -(((i * 7 + r * 13) % 110) as f64) - 1.7).collect()
    }

    #[test]
    fn test_shift_and_overwrite_agree() {
        let mut spec = Spectrogram::new(8, 5, linear_axis()).unwrap();
        for r in 0..8 {
            spec.fill(&row(8, r)).unwrap();
        }

        spec.set_time_mode(TimeAxisMode::Overwrite);
        let view = spec.draw();
        let cursor = view.cursor_row.unwrap();
        assert_eq!(cursor, 3);
        let overwrite: Vec<Vec<u32>> = (0..5).map(|t| view.row(t).to_vec()).collect();

        spec.set_time_mode(TimeAxisMode::Shift);
        let view = spec.draw();
        for t in 0..5 {
            assert_eq!(view.row(t), &overwrite[(cursor + t) % 5][..]);
        }
    }

    #[test]
    fn test_palette_change_keeps_history() {
        let mut spec = Spectrogram::new(8, 4, linear_axis()).unwrap();
        for r in 0..6 {
            spec.fill(&row(8, r)).unwrap();
        }
        let before = spec.history().to_vec();

        spec.set_palette(Palette::Viridis);
        assert_eq!(spec.history().to_vec(), before);
        assert_eq!(spec.history().pointer(), 2);

        let mut reference = Spectrogram::new(8, 4, linear_axis()).unwrap();
        reference.set_palette(Palette::Viridis);
        for r in 0..6 {
            reference.fill(&row(8, r)).unwrap();
        }
        let a = spec.draw().pixels.to_vec();
        let b = reference.draw().pixels.to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reshape_clears_history() {
        let mut spec = Spectrogram::new(8, 4, linear_axis()).unwrap();
        spec.fill(&row(8, 0)).unwrap();

        spec.init(8, 4, linear_axis()).unwrap();
        assert_eq!(spec.history().pointer(), 1);

        spec.init(16, 4, linear_axis()).unwrap();
        assert_eq!(spec.history().pointer(), 0);
        assert_eq!(spec.n_freq(), 16);
        assert!(spec.history().to_vec().iter().all(|&l| l == 32767));
        assert!(spec.fill(&row(8, 0)).is_err());
    }

    #[test]
    fn test_switch_log_mode_rebuilds_from_history() {
        let mut spec = Spectrogram::new(64, 3, log_axis()).unwrap();
        for r in 0..3 {
            spec.fill(&vec![-20.0 - r as f64; 65]).unwrap();
        }

        spec.set_log_axis_mode(LogAxisMode::Segmented);
        assert_eq!(spec.log_axis_mode(), LogAxisMode::Segmented);
        let view = spec.draw();
        assert_eq!(view.width, 256);
        assert!(!view.segments.is_empty());
        // Replayed rows are painted, not background
        let background = ColorScale::default().color(f64::NEG_INFINITY);
        assert!(view.row(2).iter().any(|&p| p != background));

        spec.set_log_axis_mode(LogAxisMode::FullRebuild);
        let view = spec.draw();
        assert_eq!(view.width, 400);
        assert!(view.segments.is_empty());
        assert!(view.row(2).iter().any(|&p| p != background));
    }

    #[test]
    fn test_state_round_trip() {
        let mut spec = Spectrogram::new(16, 6, log_axis()).unwrap();
        spec.set_palette(Palette::Magma);
        spec.set_time_mode(TimeAxisMode::Overwrite);
        spec.set_log_axis_mode(LogAxisMode::Segmented);
        for r in 0..9 {
            spec.fill(&row(16, r)).unwrap();
        }
        let json = spec.save_state().unwrap();

        let mut restored = Spectrogram::new(4, 2, linear_axis()).unwrap();
        restored.restore_state(&json).unwrap();
        assert_eq!(restored.history().to_vec(), spec.history().to_vec());
        assert_eq!(restored.history().pointer(), 3);
        assert_eq!(restored.axis(), spec.axis());
        assert_eq!(restored.log_axis_mode(), LogAxisMode::Segmented);
        assert_eq!(restored.time_mode(), TimeAxisMode::Overwrite);
        assert_eq!(restored.colors().palette(), Palette::Magma);

        spec.rebuild_all();
        assert_eq!(restored.draw().pixels.to_vec(), spec.draw().pixels.to_vec());
    }

    #[test]
    fn test_restore_rejects_bad_state() {
        let spec = Spectrogram::new(4, 2, linear_axis()).unwrap();
        let mut state = spec.state();
        state.levels.pop();

        let mut target = Spectrogram::new(4, 2, linear_axis()).unwrap();
        assert!(matches!(target.restore(state), Err(AnalyzerError::InvalidState(_))));
        assert!(target.restore_state("not json").is_err());
    }

    #[test]
    fn test_zero_rows_rejected() {
        assert!(matches!(
            Spectrogram::new(8, 0, linear_axis()),
            Err(AnalyzerError::InvalidShape { n_freq: 8, n_time: 0 })
        ));
        assert!(Spectrogram::new(0, 4, linear_axis()).is_err());

        let mut spec = Spectrogram::new(8, 4, linear_axis()).unwrap();
        assert!(spec.init(8, 0, linear_axis()).is_err());
        // The rejected shape leaves the spectrogram usable
        spec.fill(&row(8, 1)).unwrap();
        assert_eq!(spec.history().pointer(), 1);

        let mut state = spec.state();
        state.n_time = 0;
        state.pointer = 0;
        state.levels.clear();
        assert!(matches!(spec.restore(state), Err(AnalyzerError::InvalidShape { .. })));
        assert_eq!(spec.n_time(), 4);
    }

    #[test]
    fn test_db_range_validation() {
        let mut spec = Spectrogram::new(4, 2, linear_axis()).unwrap();
        assert!(spec.set_db_range(-80.0, -10.0).is_ok());
        assert_eq!(spec.colors().db_lower(), -80.0);
        assert!(spec.set_db_range(0.0, 0.0).is_err());
    }

    #[test]
    fn test_shared_fill_from_thread() {
        let shared = SharedSpectrogram::new(Spectrogram::new(8, 4, linear_axis()).unwrap());
        let producer = shared.clone();
        let handle = std::thread::spawn(move || {
            for r in 0..6 {
                producer.fill(&row(8, r)).unwrap();
            }
        });
        handle.join().unwrap();

        assert_eq!(shared.lock().history().pointer(), 2);
        let height = shared.with_view(|view| view.height);
        assert_eq!(height, 4);
    }
}
