//! Serializable snapshot of a spectrogram

use super::palette::Palette;
use super::raster::TimeAxisMode;
use super::LogAxisMode;
use crate::axis::AxisMapping;
use serde::{Deserialize, Serialize};

/// Everything needed to rebuild a `Spectrogram`, rasters excluded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrogramState {
    pub n_freq: usize,
    pub n_time: usize,
    pub pointer: usize,
    /// Quantized history in storage order, `n_time * (n_freq + 1)` levels
    pub levels: Vec<i16>,
    pub axis: AxisMapping,
    pub log_mode: LogAxisMode,
    pub time_mode: TimeAxisMode,
    pub palette: Palette,
    pub smooth: bool,
    pub db_lower: f64,
    pub db_upper: f64,
}
