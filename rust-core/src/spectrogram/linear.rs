//! Linear-frequency raster, one column per non-DC bin

use super::history::SpectrogramHistory;
use super::palette::ColorScale;
use super::raster::Raster;

#[derive(Debug, Clone, Default)]
pub struct LinearRaster {
    n_freq: usize,
    raster: Raster,
    row_db: Vec<f64>,
}

impl LinearRaster {
    pub fn new(n_freq: usize, n_time: usize) -> Self {
        Self {
            n_freq,
            raster: Raster::new(n_freq, n_time),
            row_db: vec![0.0; n_freq + 1],
        }
    }

    /// Paint one spectrum of `n_freq + 1` values, DC skipped
    pub fn fill(&mut self, db: &[f64], colors: &ColorScale) {
        for (px, &d) in self.raster.current_row_mut().iter_mut().zip(&db[1..]) {
            *px = colors.color(d);
        }
        self.raster.advance();
    }

    /// Repaint every row from the history
    pub fn rebuild_from(&mut self, history: &SpectrogramHistory, colors: &ColorScale) {
        if self.n_freq != history.n_freq() || self.raster.height() != history.n_time() {
            *self = Self::new(history.n_freq(), history.n_time());
        }

        let mut row_db = std::mem::take(&mut self.row_db);
        self.raster.set_pointer(0);
        for t in 0..history.n_time() {
            history.row_db(t, &mut row_db);
            self.fill(&row_db, colors);
        }
        self.raster.set_pointer(history.pointer());
        self.row_db = row_db;
    }

    pub fn raster_mut(&mut self) -> &mut Raster {
        &mut self.raster
    }
}
