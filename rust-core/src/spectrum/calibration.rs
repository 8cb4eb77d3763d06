//! Microphone calibration curves
//!
//! Reads the line-oriented `frequency gainDB` text files produced by common
//! measurement microphone vendors and interpolates them onto analysis bins.
//! Bad lines are skipped with a warning; they never abort the load.

use crate::error::{AnalyzerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_CENTRAL_FREQ: f64 = 1000.0;
const DEFAULT_CENTRAL_GAIN: f64 = -37.4;

/// Frequency response of a microphone, in dB
///
/// Always holds at least one point with as many gains as frequencies;
/// deserialization goes through the same checks as `new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCalibration")]
pub struct Calibration {
    /// Curve label, usually the file name
    name: String,
    /// Ascending frequencies in Hz
    freq: Vec<f64>,
    /// Gain at each frequency in dB
    gain_db: Vec<f64>,
    /// Sensitivity reference from a Dayton-style `*1000Hz -37.4` header
    central_freq: f64,
    central_gain: f64,
}

#[derive(Deserialize)]
struct RawCalibration {
    name: String,
    freq: Vec<f64>,
    gain_db: Vec<f64>,
    #[serde(default = "default_central_freq")]
    central_freq: f64,
    #[serde(default = "default_central_gain")]
    central_gain: f64,
}

fn default_central_freq() -> f64 {
    DEFAULT_CENTRAL_FREQ
}

fn default_central_gain() -> f64 {
    DEFAULT_CENTRAL_GAIN
}

impl TryFrom<RawCalibration> for Calibration {
    type Error = AnalyzerError;

    fn try_from(raw: RawCalibration) -> Result<Self> {
        let mut calib = Calibration::new(raw.name, raw.freq, raw.gain_db)?;
        calib.central_freq = raw.central_freq;
        calib.central_gain = raw.central_gain;
        Ok(calib)
    }
}

impl Calibration {
    /// Build a curve from explicit points
    pub fn new(name: impl Into<String>, freq: Vec<f64>, gain_db: Vec<f64>) -> Result<Self> {
        if freq.len() != gain_db.len() {
            return Err(AnalyzerError::InvalidCalibration(format!(
                "{} frequencies but {} gains",
                freq.len(),
                gain_db.len()
            )));
        }
        if freq.is_empty() {
            return Err(AnalyzerError::InvalidCalibration("no data points".into()));
        }
        if freq.iter().chain(&gain_db).any(|v| !v.is_finite()) {
            return Err(AnalyzerError::InvalidCalibration("non-finite data point".into()));
        }

        let mut points: Vec<(f64, f64)> = freq.into_iter().zip(gain_db).collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (freq, gain_db) = points.into_iter().unzip();

        Ok(Self {
            name: name.into(),
            freq,
            gain_db,
            central_freq: DEFAULT_CENTRAL_FREQ,
            central_gain: DEFAULT_CENTRAL_GAIN,
        })
    }

    /// Parse calibration text
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let mut freq = Vec::new();
        let mut gain = Vec::new();
        let mut central = None;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            let Some(first) = line.chars().next() else {
                continue;
            };

            match first {
                '0'..='9' | '.' | '-' => match parse_pair(line) {
                    Some((f, g)) => {
                        freq.push(f);
                        gain.push(g);
                    }
                    None => log::warn!("{}: skipping line {}: {:?}", name, lineno + 1, line),
                },
                // Dayton Audio header "*1000Hz\t-37.4"; other '*' headers are ignored
                '*' => {
                    if let Some(pair) = parse_dayton_header(&line[1..]) {
                        log::info!("{}: Dayton Audio header {} Hz {} dB", name, pair.0, pair.1);
                        central = Some(pair);
                    }
                }
                '"' | '#' => {}
                _ => log::warn!("{}: skipping line {}: {:?}", name, lineno + 1, line),
            }
        }

        let mut calib = Self::new(name, freq, gain)?;
        if let Some((f, g)) = central {
            calib.central_freq = f;
            calib.central_gain = g;
        }
        Ok(calib)
    }

    /// Load and parse a calibration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::parse(&name, &text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ascending frequencies in Hz
    pub fn freq(&self) -> &[f64] {
        &self.freq
    }

    /// Gain at each of `freq()` in dB
    pub fn gain_db(&self) -> &[f64] {
        &self.gain_db
    }

    /// Reference frequency and sensitivity from the file header
    pub fn central(&self) -> (f64, f64) {
        (self.central_freq, self.central_gain)
    }

    /// Check the curve shape
    pub fn validate(&self) -> Result<()> {
        if self.freq.is_empty() || self.freq.len() != self.gain_db.len() {
            return Err(AnalyzerError::InvalidCalibration(format!(
                "{} frequencies but {} gains",
                self.freq.len(),
                self.gain_db.len()
            )));
        }
        Ok(())
    }

    /// Linear interpolation of the gain curve, clamped at both ends
    pub fn gain_at(&self, f: f64) -> f64 {
        let n = self.freq.len();
        if f <= self.freq[0] {
            return self.gain_db[0];
        }
        if f >= self.freq[n - 1] {
            return self.gain_db[n - 1];
        }

        // First point strictly above f
        let hi = self.freq.partition_point(|&x| x <= f);
        let lo = hi - 1;
        let span = self.freq[hi] - self.freq[lo];
        if span <= 0.0 {
            return self.gain_db[hi];
        }
        self.gain_db[lo] + (self.gain_db[hi] - self.gain_db[lo]) * (f - self.freq[lo]) / span
    }

    /// Gain in dB on each of the `fft_len/2 + 1` analysis bins
    pub fn bin_gains_db(&self, fft_len: usize, sample_rate: f64) -> Vec<f64> {
        (0..=fft_len / 2)
            .map(|i| self.gain_at(i as f64 * sample_rate / fft_len as f64))
            .collect()
    }
}

fn parse_pair(line: &str) -> Option<(f64, f64)> {
    let mut fields = line.split_whitespace();
    let f = fields.next()?.parse().ok()?;
    let g = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((f, g))
}

fn parse_dayton_header(rest: &str) -> Option<(f64, f64)> {
    let (f, g) = rest.split_once("Hz")?;
    if !g.starts_with(|c: char| c == ' ' || c == '\t') {
        return None;
    }
    Some((f.trim().parse().ok()?, g.trim().parse().ok()?))
}
