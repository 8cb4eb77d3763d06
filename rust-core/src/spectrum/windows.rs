//! Window functions for spectral analysis
//!
//! Every analysis window is normalized so that its coefficients sum to the
//! frame length, which keeps the level of a sine wave independent of the
//! window choice. The energy factor `N / sum(w^2)` converts integrated spectral
//! power back into an RMS figure.

use super::bessel;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WindowType {
    /// Rectangular window (no windowing), also used for unknown names
    Rectangular,

    /// Triangular window
    Bartlett,

    /// Hann window: w[n] = 0.5 - 0.5*cos(2πn/(N-1))
    Hanning,

    /// Blackman window: w[n] = 0.42 - 0.5*cos(2πn/(N-1)) + 0.08*cos(4πn/(N-1))
    Blackman,

    /// Four-term Blackman-Harris window (~92 dB sidelobes)
    BlackmanHarris,

    /// Kaiser window with shape factor `alpha` (beta = π·alpha)
    Kaiser { alpha: f64 },

    /// Flat-top window, accurate amplitude for off-bin tones
    FlatTop,

    /// Four-term Nuttall window
    Nuttall,

    /// Gaussian window, `beta` is the number of standard deviations at the edge
    Gaussian { beta: f64 },
}

impl Default for WindowType {
    fn default() -> Self {
        WindowType::Hanning
    }
}

impl WindowType {
    /// All window functions offered for selection
    pub fn all() -> Vec<WindowType> {
        vec![
            WindowType::Rectangular,
            WindowType::Bartlett,
            WindowType::Hanning,
            WindowType::Blackman,
            WindowType::BlackmanHarris,
            WindowType::Kaiser { alpha: 2.0 },
            WindowType::Kaiser { alpha: 3.0 },
            WindowType::Kaiser { alpha: 4.0 },
            WindowType::Kaiser { alpha: 5.0 },
            WindowType::Kaiser { alpha: 6.0 },
            WindowType::FlatTop,
            WindowType::Nuttall,
            WindowType::Gaussian { beta: 3.0 },
            WindowType::Gaussian { beta: 5.0 },
            WindowType::Gaussian { beta: 6.0 },
        ]
    }

    /// Look up a window by its display name
    ///
    /// Unrecognized names fall back to the rectangular window.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        Self::all()
            .into_iter()
            .find(|w| w.name().eq_ignore_ascii_case(name))
            .unwrap_or_else(|| {
                log::debug!("Unknown window \"{}\", using rectangular", name);
                WindowType::Rectangular
            })
    }

    /// Display name, e.g. "Kaiser, a=3.0"
    pub fn name(&self) -> String {
        match self {
            WindowType::Rectangular => "Rectangular".to_string(),
            WindowType::Bartlett => "Bartlett".to_string(),
            WindowType::Hanning => "Hanning".to_string(),
            WindowType::Blackman => "Blackman".to_string(),
            WindowType::BlackmanHarris => "Blackman Harris".to_string(),
            WindowType::Kaiser { alpha } => format!("Kaiser, a={:.1}", alpha),
            WindowType::FlatTop => "Flat-top".to_string(),
            WindowType::Nuttall => "Nuttall".to_string(),
            WindowType::Gaussian { beta } => format!("Gaussian, b={:.1}", beta),
        }
    }
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Generate raw (unnormalized) window coefficients
///
/// # Arguments
/// * `window_type` - Type of window function
/// * `length` - Number of samples (N)
///
/// # Returns
/// Vector of window coefficients w[n] for n = 0..N-1
pub fn generate_window(window_type: WindowType, length: usize) -> Vec<f64> {
    if length <= 1 {
        return vec![1.0; length];
    }

    let m = (length - 1) as f64;
    // Cosine argument 2πn/(N-1)
    let phase = |n: usize| 2.0 * PI * n as f64 / m;
    // Position mapped onto [-1, 1]
    let centered = |n: usize| 2.0 * n as f64 / m - 1.0;

    (0..length)
        .map(|n| match window_type {
            WindowType::Rectangular => 1.0,

            WindowType::Bartlett => {
                (PI * n as f64 / length as f64).sin().asin() / PI * 2.0
            }

            WindowType::Hanning => 0.5 * (1.0 - phase(n).cos()),

            WindowType::Blackman => {
                0.42 - 0.5 * phase(n).cos() + 0.08 * (2.0 * phase(n)).cos()
            }

            WindowType::BlackmanHarris => {
                let x = phase(n);
                0.35875 - 0.48829 * x.cos() + 0.14128 * (2.0 * x).cos()
                    - 0.01168 * (3.0 * x).cos()
            }

            WindowType::Kaiser { alpha } => {
                let c = centered(n);
                bessel::i0(PI * alpha * (1.0 - c * c).max(0.0).sqrt()) / bessel::i0(PI * alpha)
            }

            WindowType::FlatTop => {
                let x = phase(n);
                1.0 - 1.93 * x.cos() + 1.29 * (2.0 * x).cos() - 0.388 * (3.0 * x).cos()
                    + 0.028 * (4.0 * x).cos()
            }

            WindowType::Nuttall => {
                let x = phase(n);
                0.355768 - 0.487396 * x.cos() + 0.144232 * (2.0 * x).cos()
                    - 0.012604 * (3.0 * x).cos()
            }

            WindowType::Gaussian { beta } => {
                let c = beta * centered(n);
                (-0.5 * c * c).exp()
            }
        })
        .collect()
}

/// Analysis window normalized to unit mean
#[derive(Debug, Clone)]
pub struct Window {
    window_type: WindowType,
    coeffs: Vec<f64>,
    energy_factor: f64,
}

impl Window {
    /// Build a window of `length` samples, scaled so that `sum(w) == length`
    pub fn new(window_type: WindowType, length: usize) -> Self {
        let mut coeffs = generate_window(window_type, length);

        let sum: f64 = coeffs.iter().sum();
        let normalize = if sum != 0.0 { length as f64 / sum } else { 1.0 };
        for w in coeffs.iter_mut() {
            *w *= normalize;
        }

        let sum_sq: f64 = coeffs.iter().map(|&w| w * w).sum();
        let energy_factor = if sum_sq > 0.0 { length as f64 / sum_sq } else { 1.0 };

        Self {
            window_type,
            coeffs,
            energy_factor,
        }
    }

    /// Normalized coefficients
    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// `N / sum(w^2)`, converts summed spectral power into an RMS estimate
    pub fn energy_factor(&self) -> f64 {
        self.energy_factor
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Multiply `frame` by the window into `out`
    pub fn apply_into(&self, frame: &[f64], out: &mut [f64]) {
        for ((o, &s), &w) in out.iter_mut().zip(frame.iter()).zip(self.coeffs.iter()) {
            *o = s * w;
        }
    }
}
