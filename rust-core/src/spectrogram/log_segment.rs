//! Log-frequency raster built once, drawn as stretched segments
//!
//! The raster is `4 * n_freq` columns wide and covers `[f_max / n_freq,
//! f_max]`. It is split into roughly one segment per octave; inside a segment
//! columns are log-spaced, and the segment edges are laid out linearly so each
//! segment can be blitted with a single horizontal scale. Zooming only moves
//! the segment placements, the raster itself is untouched.

use super::history::SpectrogramHistory;
use super::palette::ColorScale;
use super::raster::{Raster, RasterView, SegmentPlacement, TimeAxisMode};
use super::{LogAxisMode, LogRenderer};
use crate::axis::{AxisMapping, AxisScale};

const COLUMNS_PER_BIN: usize = 4;
const EDGE_TOLERANCE: f64 = 1e-7;

#[derive(Debug)]
pub struct Segmented {
    n_freq: usize,
    n_time: usize,
    raster: Raster,
    /// Raster column of each segment edge
    pixel_edges: Vec<f64>,
    /// Frequency at each segment edge
    freq_edges: Vec<f64>,
    /// Raster column of each bin's upper edge
    bin_edges: Vec<f64>,
    energy: Vec<f64>,
    coverage: Vec<f64>,
    placements: Vec<SegmentPlacement>,
    row_db: Vec<f64>,
}

impl Segmented {
    pub fn new(n_freq: usize, n_time: usize, axis: &AxisMapping) -> Self {
        let mut renderer = Self {
            n_freq,
            n_time,
            raster: Raster::default(),
            pixel_edges: Vec::new(),
            freq_edges: Vec::new(),
            bin_edges: Vec::new(),
            energy: Vec::new(),
            coverage: Vec::new(),
            placements: Vec::new(),
            row_db: vec![0.0; n_freq + 1],
        };
        renderer.init(n_freq, n_time, axis);
        renderer
    }

    pub fn n_segments(&self) -> usize {
        self.pixel_edges.len().saturating_sub(1)
    }

    pub fn pixel_edges(&self) -> &[f64] {
        &self.pixel_edges
    }

    pub fn freq_edges(&self) -> &[f64] {
        &self.freq_edges
    }

    pub fn bin_edges(&self) -> &[f64] {
        &self.bin_edges
    }

    fn build_segments(&mut self, axis: &AxisMapping) {
        let n = self.n_freq;
        let width = self.raster.width() as f64;
        let max_f = axis.lower().max(axis.upper());

        self.pixel_edges.clear();
        self.freq_edges.clear();
        self.bin_edges.clear();
        self.bin_edges.resize(n + 1, width);
        if let Some(first) = self.bin_edges.first_mut() {
            *first = 0.0;
        }
        if n < 2 || !(max_f > 0.0) {
            log::debug!("Segmented log raster disabled for {} bins", n);
            return;
        }

        let min_f = max_f / n as f64;
        let ratio = max_f / min_f;
        let n_seg = (ratio.log2().ceil() as usize).max(1);

        for i in 0..=n_seg {
            let f = ratio.powf(i as f64 / n_seg as f64) * min_f;
            let pix = ((f - min_f) / (max_f - min_f) * width).floor();
            self.pixel_edges.push(pix);
            self.freq_edges.push(pix / width * (max_f - min_f) + min_f);
        }

        let d_freq = max_f / n as f64;
        let mut bin = 1;
        for i in 1..=n_seg {
            let seg_width = (self.pixel_edges[i] - self.pixel_edges[i - 1]).round();
            if seg_width <= 0.0 {
                continue;
            }
            let seg_axis = match AxisMapping::new(
                seg_width,
                self.freq_edges[i - 1],
                self.freq_edges[i],
                AxisScale::Log,
            ) {
                Ok(a) => a,
                Err(_) => continue,
            };
            while bin <= n && (bin as f64 + 0.5) * d_freq <= self.freq_edges[i] + EDGE_TOLERANCE {
                self.bin_edges[bin] =
                    seg_axis.pixel_from_v((bin as f64 + 0.5) * d_freq) + self.pixel_edges[i - 1];
                bin += 1;
            }
        }
    }

    fn place_segments(&mut self, axis: &AxisMapping) {
        self.placements.clear();
        for i in 1..self.pixel_edges.len() {
            let src_x = self.pixel_edges[i - 1];
            let src_width = self.pixel_edges[i] - src_x;
            if src_width <= 0.0 {
                continue;
            }
            let dest_start = axis.pixel_no_zoom_from_v(self.freq_edges[i - 1]);
            let dest_end = axis.pixel_no_zoom_from_v(self.freq_edges[i]);
            self.placements.push(SegmentPlacement {
                src_x: src_x as usize,
                src_width: src_width as usize,
                dest_start,
                dest_end,
                scale: (dest_end - dest_start) / src_width,
            });
        }
    }
}

impl LogRenderer for Segmented {
    fn mode(&self) -> LogAxisMode {
        LogAxisMode::Segmented
    }

    fn init(&mut self, n_freq: usize, n_time: usize, axis: &AxisMapping) {
        let resized = self.raster.resize(COLUMNS_PER_BIN * n_freq, n_time);
        if !resized && (n_freq != self.n_freq || n_time != self.n_time) {
            self.raster.clear();
        }
        self.n_freq = n_freq;
        self.n_time = n_time;
        self.row_db.resize(n_freq + 1, 0.0);
        self.energy = vec![0.0; self.raster.width()];
        self.coverage = vec![0.0; self.raster.width()];
        self.build_segments(axis);
    }

    fn fill(&mut self, db: &[f64], colors: &ColorScale) {
        let width = self.raster.width();
        self.energy.fill(0.0);
        self.coverage.fill(0.0);

        // Spread each bin's power over its column range, weighted by overlap
        let mut b0 = self.bin_edges.first().copied().unwrap_or(0.0);
        for (&edge, &d) in self.bin_edges.iter().zip(db).skip(1) {
            let b1 = edge.min(width as f64);
            if b1 > b0 {
                let power = 10f64.powf(d / 10.0);
                let first = b0.floor() as usize;
                let last = (b1.ceil() as usize).min(width);
                for j in first..last {
                    let overlap = b1.min(j as f64 + 1.0) - b0.max(j as f64);
                    if overlap > 0.0 {
                        self.energy[j] += power * overlap;
                        self.coverage[j] += overlap;
                    }
                }
            }
            b0 = b0.max(b1);
        }

        let row = self.raster.current_row_mut();
        for ((px, &e), &c) in row.iter_mut().zip(&self.energy).zip(&self.coverage) {
            let level = if c > 0.0 {
                10.0 * (e / c).log10()
            } else {
                f64::NEG_INFINITY
            };
            *px = colors.color(level);
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
    }

    fn update_axis(&mut self, axis: &AxisMapping) {
        self.init(self.n_freq, self.n_time, axis);
    }

    fn update_zoom(&mut self, _axis: &AxisMapping) {}

    fn draw(
        &mut self,
        mode: TimeAxisMode,
        axis: &AxisMapping,
        _history: &SpectrogramHistory,
        _colors: &ColorScale,
        smooth: bool,
    ) -> RasterView<'_> {
        self.place_segments(axis);
        self.raster.view(mode, &self.placements, false, smooth)
    }
}
