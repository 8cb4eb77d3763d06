//! Log-frequency raster rebuilt from the history on every axis change
//!
//! Each bin owns a pixel range `[lo, hi)` computed through the current
//! (zoomed) axis. Because the index depends on zoom and shift, any axis change
//! marks the raster stale and the next draw replays the whole history.

use super::history::SpectrogramHistory;
use super::palette::ColorScale;
use super::raster::{Raster, RasterView, TimeAxisMode};
use super::{LogAxisMode, LogRenderer};
use crate::axis::AxisMapping;

const DEFAULT_WIDTH: usize = 1000;
const MAX_WIDTH: usize = 2000;

/// Raster width for a viewport of `axis.n_pixels()` pixels
pub fn raster_width(axis: &AxisMapping) -> usize {
    let n = axis.n_pixels().max(0.0) as usize;
    if n <= 1 {
        DEFAULT_WIDTH
    } else {
        n.min(MAX_WIDTH)
    }
}

#[derive(Debug)]
pub struct FullRebuild {
    n_freq: usize,
    n_time: usize,
    raster: Raster,
    /// First pixel of each bin
    pix_lo: Vec<usize>,
    /// One past the last pixel of each bin
    pix_hi: Vec<usize>,
    /// Bin overlaps the viewport
    visible: Vec<bool>,
    /// Axis was reversed, raster is built low-to-high
    mirrored: bool,
    need_rebuild: bool,
    row_db: Vec<f64>,
}

impl FullRebuild {
    pub fn new(n_freq: usize, n_time: usize, axis: &AxisMapping) -> Self {
        let mut renderer = Self {
            n_freq,
            n_time,
            raster: Raster::default(),
            pix_lo: Vec::new(),
            pix_hi: Vec::new(),
            visible: Vec::new(),
            mirrored: false,
            need_rebuild: false,
            row_db: vec![0.0; n_freq + 1],
        };
        renderer.init(n_freq, n_time, axis);
        renderer
    }

    pub fn needs_rebuild(&self) -> bool {
        self.need_rebuild
    }

    pub fn width(&self) -> usize {
        self.raster.width()
    }

    fn build_index(&mut self, axis: &AxisMapping) {
        let width = self.raster.width();
        let n = self.n_freq;

        // Index is always built on an ascending axis
        let mut ascending = axis.clone();
        self.mirrored = axis.is_reversed();
        if self.mirrored {
            if let Err(e) = ascending.reverse_bounds() {
                log::warn!("Cannot flip frequency axis: {}", e);
            }
        }

        let d_freq = ascending.upper() / n.max(1) as f64;
        let (view_lo, view_hi) = (ascending.v_min_in_view(), ascending.v_max_in_view());
        let column = |v: f64| (ascending.unit_from_v(v, view_lo, view_hi) * width as f64).floor();

        self.pix_lo.resize(n + 1, 0);
        self.pix_hi.resize(n + 1, 0);
        self.visible.resize(n + 1, false);
        let last = width.saturating_sub(1) as f64;
        for i in 0..=n {
            let lo = column((i as f64 - 0.5) * d_freq);
            let hi = column((i as f64 + 0.5) * d_freq);
            self.visible[i] = hi >= 0.0 && lo < width as f64;
            self.pix_lo[i] = lo.clamp(0.0, last) as usize;
            self.pix_hi[i] = hi.clamp(0.0, last) as usize;
        }
    }
}

impl LogRenderer for FullRebuild {
    fn mode(&self) -> LogAxisMode {
        LogAxisMode::FullRebuild
    }

    fn init(&mut self, n_freq: usize, n_time: usize, axis: &AxisMapping) {
        let resized = self.raster.resize(raster_width(axis), n_time);
        if !resized && (n_freq != self.n_freq || n_time != self.n_time) {
            self.raster.clear();
        }
        self.n_freq = n_freq;
        self.n_time = n_time;
        self.row_db.resize(n_freq + 1, 0.0);
        self.build_index(axis);
    }

    fn fill(&mut self, db: &[f64], colors: &ColorScale) {
        let n = self.n_freq;
        let row = self.raster.current_row_mut();
        row.fill(0);

        let mut i = 1;
        while i <= n {
            if !self.visible[i] {
                i += 1;
                continue;
            }

            // Bins starting on the same pixel collapse into their maximum
            let lo = self.pix_lo[i];
            let mut max_db = db[i];
            let mut j = i + 1;
            while j <= n && self.visible[j] && self.pix_lo[j] == lo {
                if db[j] > max_db {
                    max_db = db[j];
                }
                j += 1;
            }

            let hi = self.pix_hi[j - 1].max(lo + 1).min(row.len());
            row[lo..hi].fill(colors.color(max_db));
            i = j;
        }
        self.raster.advance();
    }

    fn rebuild_from(&mut self, history: &SpectrogramHistory, axis: &AxisMapping, colors: &ColorScale) {
        self.init(history.n_freq(), history.n_time(), axis);

        let mut row_db = std::mem::take(&mut self.row_db);
        self.raster.set_pointer(0);
        for t in 0..history.n_time() {
            history.row_db(t, &mut row_db);
            self.fill(&row_db, colors);
        }
        self.raster.set_pointer(history.pointer());
        self.row_db = row_db;
        self.need_rebuild = false;
        log::debug!(
            "Rebuilt log spectrogram: {} bins -> {} px, {} rows",
            self.n_freq,
            self.raster.width(),
            self.n_time
        );
    }

    fn update_axis(&mut self, axis: &AxisMapping) {
        self.init(self.n_freq, self.n_time, axis);
        self.need_rebuild = true;
    }

    fn update_zoom(&mut self, _axis: &AxisMapping) {
        self.need_rebuild = true;
    }

    fn draw(
        &mut self,
        mode: TimeAxisMode,
        axis: &AxisMapping,
        history: &SpectrogramHistory,
        colors: &ColorScale,
        smooth: bool,
    ) -> RasterView<'_> {
        if self.need_rebuild {
            self.rebuild_from(history, axis, colors);
        }
        self.raster.view(mode, &[], self.mirrored, smooth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisScale;
    use crate::spectrogram::palette::Palette;

    fn log_axis(n_pixels: f64) -> AxisMapping {
        AxisMapping::new(n_pixels, 10.0, 8000.0, AxisScale::Log).unwrap()
    }

    #[test]
    fn test_raster_width_limits() {
        assert_eq!(raster_width(&log_axis(0.0)), 1000);
        assert_eq!(raster_width(&log_axis(1.0)), 1000);
        assert_eq!(raster_width(&log_axis(640.0)), 640);
        assert_eq!(raster_width(&log_axis(5000.0)), 2000);
    }

    #[test]
    fn test_bin_ranges_are_ordered() {
        let renderer = FullRebuild::new(512, 4, &log_axis(800.0));
        for i in 1..=512 {
            assert!(renderer.pix_lo[i] <= renderer.pix_hi[i]);
            if i > 1 {
                assert!(renderer.pix_lo[i - 1] <= renderer.pix_lo[i]);
            }
        }
        // Low bins spread over many pixels, high bins share pixels
        assert!(renderer.pix_hi[2] - renderer.pix_lo[2] > 10);
        assert_eq!(renderer.pix_lo[500], renderer.pix_lo[501]);
    }

    #[test]
    fn test_collapsed_bins_show_maximum() {
        let colors = ColorScale::new(Palette::Gray, -120.0, 0.0);
        let mut renderer = FullRebuild::new(512, 1, &log_axis(800.0));

        let mut db = vec![-120.0; 513];
        db[501] = 0.0;
        renderer.fill(&db, &colors);

        let lo = renderer.pix_lo[501];
        let view = renderer.raster.view(TimeAxisMode::Overwrite, &[], false, false);
        assert_eq!(view.pixels[lo], 0xffffffff);
    }

    #[test]
    fn test_axis_change_sets_rebuild_flag() {
        let colors = ColorScale::default();
        let history = SpectrogramHistory::new(64, 3);
        let mut axis = log_axis(300.0);
        let mut renderer = FullRebuild::new(64, 3, &axis);
        assert!(!renderer.needs_rebuild());

        axis.set_zoom_shift(2.0, 0.1).unwrap();
        renderer.update_zoom(&axis);
        assert!(renderer.needs_rebuild());

        let view = renderer.draw(TimeAxisMode::Shift, &axis, &history, &colors, false);
        assert_eq!(view.width, 300);
        assert!(!renderer.needs_rebuild());
    }

    #[test]
    fn test_reversed_axis_is_mirrored() {
        let mut axis = log_axis(400.0);
        axis.reverse_bounds().unwrap();
        let renderer = FullRebuild::new(128, 2, &axis);
        assert!(renderer.mirrored);
        // Index still ascends with frequency
        assert!(renderer.pix_lo[10] < renderer.pix_lo[100]);
    }
}
