//! Compact circular store of past spectra
//!
//! Each row holds `n_freq + 1` bins quantized to 16-bit levels, 0 being the
//! loudest (`MAX_DB`) and 32767 the quietest. Rasters are always derivable from
//! this store.

use crate::error::{AnalyzerError, Result};
use ndarray::{Array2, ArrayView1};

/// Loudest representable level in dB
pub const MAX_DB: f64 = 12.0;
/// Quietest representable level in dB
pub const MIN_DB: f64 = -144.0;

const N_LEVELS: usize = 32768;
const SILENT_LEVEL: i16 = 32767;

/// Map a dB value onto `0..n_levels`, 0 for `db >= upper`
///
/// Values at or below `lower`, and non-finite values, map to the last level.
pub fn level_from_db(db: f64, lower: f64, upper: f64, n_levels: usize) -> usize {
    if db >= upper {
        return 0;
    }
    if db <= lower || !db.is_finite() {
        return n_levels - 1;
    }
    ((n_levels as f64 * (upper - db) / (upper - lower)) as usize).min(n_levels - 1)
}

pub fn quantize(db: f64) -> i16 {
    level_from_db(db, MIN_DB, MAX_DB, N_LEVELS) as i16
}

pub fn dequantize(level: i16) -> f64 {
    MAX_DB - (MAX_DB - MIN_DB) / N_LEVELS as f64 * level as f64
}

/// Rolling history of quantized spectra
#[derive(Debug, Clone)]
pub struct SpectrogramHistory {
    /// `n_time` rows of `n_freq + 1` levels
    levels: Array2<i16>,
    /// Row written by the next `push`
    pointer: usize,
}

impl SpectrogramHistory {
    pub fn new(n_freq: usize, n_time: usize) -> Self {
        Self {
            levels: Array2::from_elem((n_time, n_freq + 1), SILENT_LEVEL),
            pointer: 0,
        }
    }

    /// Rebuild from raw parts, e.g. a saved state
    pub fn from_levels(n_freq: usize, n_time: usize, levels: Vec<i16>, pointer: usize) -> Result<Self> {
        if n_time == 0 {
            return Err(AnalyzerError::InvalidState("no rows".into()));
        }
        if pointer >= n_time {
            return Err(AnalyzerError::InvalidState(format!(
                "row pointer {} outside {} rows",
                pointer, n_time
            )));
        }
        let levels = Array2::from_shape_vec((n_time, n_freq + 1), levels)
            .map_err(|e| AnalyzerError::InvalidState(e.to_string()))?;
        Ok(Self { levels, pointer })
    }

    /// Number of frequency bins, excluding DC
    pub fn n_freq(&self) -> usize {
        self.levels.ncols() - 1
    }

    /// Number of rows
    pub fn n_time(&self) -> usize {
        self.levels.nrows()
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn clear(&mut self) {
        self.levels.fill(SILENT_LEVEL);
        self.pointer = 0;
    }

    /// Quantize and store one spectrum of `n_freq + 1` dB values
    pub fn push(&mut self, db: &[f64]) -> Result<()> {
        let expected = self.levels.ncols();
        if db.len() != expected {
            return Err(AnalyzerError::RowLength {
                expected,
                got: db.len(),
            });
        }
        if self.n_time() == 0 {
            return Ok(());
        }

        let mut row = self.levels.row_mut(self.pointer);
        for (level, &d) in row.iter_mut().zip(db) {
            *level = quantize(d);
        }
        self.pointer = (self.pointer + 1) % self.n_time();
        Ok(())
    }

    /// Row in storage order
    pub fn row(&self, t: usize) -> ArrayView1<'_, i16> {
        self.levels.row(t)
    }

    /// Row `t` converted back to dB
    pub fn row_db(&self, t: usize, out: &mut [f64]) {
        for (o, &level) in out.iter_mut().zip(self.levels.row(t).iter()) {
            *o = dequantize(level);
        }
    }

    /// Rows from oldest to newest, starting at the write pointer
    pub fn rows_oldest_first(&self) -> impl Iterator<Item = ArrayView1<'_, i16>> + '_ {
        let n = self.n_time();
        (0..n).map(move |k| self.levels.row((self.pointer + k) % n))
    }

    /// Raw levels in storage order
    pub fn as_slice(&self) -> Option<&[i16]> {
        self.levels.as_slice()
    }

    pub fn to_vec(&self) -> Vec<i16> {
        self.levels.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_db_bounds() {
        assert_eq!(level_from_db(0.0, -120.0, 0.0, 256), 0);
        assert_eq!(level_from_db(5.0, -120.0, 0.0, 256), 0);
        assert_eq!(level_from_db(-120.0, -120.0, 0.0, 256), 255);
        assert_eq!(level_from_db(f64::NEG_INFINITY, -120.0, 0.0, 256), 255);
        assert_eq!(level_from_db(f64::NAN, -120.0, 0.0, 256), 255);
        assert_eq!(level_from_db(-60.0, -120.0, 0.0, 256), 128);
    }

    #[test]
    fn test_quantize_round_trip() {
        for &db in &[-100.0, -50.5, 0.0, 11.9] {
            let back = dequantize(quantize(db));
            assert!((back - db).abs() <= (MAX_DB - MIN_DB) / 32768.0 + 1e-12);
        }
        assert_eq!(quantize(f64::NEG_INFINITY), 32767);
        assert_eq!(quantize(20.0), 0);
    }

    #[test]
    fn test_circular_semantics() {
        let n_time = 5;
        let mut history = SpectrogramHistory::new(4, n_time);

        // Row r is a constant -r dB
        for r in 0..n_time + 3 {
            history.push(&vec![-(r as f64); 5]).unwrap();
        }
        assert_eq!(history.pointer(), 3);

        let rows: Vec<i16> = history.rows_oldest_first().map(|row| row[0]).collect();
        let expected: Vec<i16> = (3..n_time + 3).map(|r| quantize(-(r as f64))).collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_row_length_checked() {
        let mut history = SpectrogramHistory::new(4, 3);
        assert!(matches!(
            history.push(&[0.0; 4]),
            Err(AnalyzerError::RowLength { expected: 5, got: 4 })
        ));
    }

    #[test]
    fn test_from_levels_validates() {
        assert!(SpectrogramHistory::from_levels(2, 2, vec![0; 6], 1).is_ok());
        assert!(SpectrogramHistory::from_levels(2, 2, vec![0; 5], 1).is_err());
        assert!(SpectrogramHistory::from_levels(2, 2, vec![0; 6], 2).is_err());
        assert!(SpectrogramHistory::from_levels(2, 0, Vec::new(), 0).is_err());
    }
}
