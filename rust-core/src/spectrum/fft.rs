//! FFT engine using realfft for real-valued signals
//!
//! The analyzer works on the half-complex packed layout
//! `[X0, Re1, Im1, Re2, Im2, ..., Re(N/2-1), Im(N/2-1), X(N/2)]`,
//! so the realfft output is repacked in place after each transform.

use crate::error::{AnalyzerError, Result};
use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// FFT engine for real-valued signals, planned once per length
pub struct FftEngine {
    /// FFT size (number of samples)
    fft_size: usize,

    /// Real FFT processor
    r2c: Arc<dyn RealToComplex<f64>>,

    /// Scratch input, realfft overwrites its input
    input_buffer: Vec<f64>,

    /// Reusable output buffer (complex spectrum)
    output_buffer: Vec<Complex<f64>>,
}

impl FftEngine {
    /// Create new FFT engine
    ///
    /// # Arguments
    /// * `fft_size` - FFT size, a power of two >= 2
    pub fn new(fft_size: usize) -> Result<Self> {
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(AnalyzerError::InvalidFftLength(fft_size));
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_size);
        let input_buffer = r2c.make_input_vec();
        let output_buffer = r2c.make_output_vec();

        Ok(Self {
            fft_size,
            r2c,
            input_buffer,
            output_buffer,
        })
    }

    /// In-place forward transform into the half-complex layout
    ///
    /// # Arguments
    /// * `buffer` - N real samples, replaced by N packed coefficients
    pub fn forward_half_complex(&mut self, buffer: &mut [f64]) -> Result<()> {
        if buffer.len() != self.fft_size {
            return Err(AnalyzerError::Fft(format!(
                "buffer has {} samples, plan is for {}",
                buffer.len(),
                self.fft_size
            )));
        }

        self.input_buffer.copy_from_slice(buffer);
        self.r2c
            .process(&mut self.input_buffer, &mut self.output_buffer)
            .map_err(|e| AnalyzerError::Fft(e.to_string()))?;

        let half = self.fft_size / 2;
        buffer[0] = self.output_buffer[0].re;
        for k in 1..half {
            buffer[2 * k - 1] = self.output_buffer[k].re;
            buffer[2 * k] = self.output_buffer[k].im;
        }
        buffer[self.fft_size - 1] = self.output_buffer[half].re;

        Ok(())
    }

    /// Get FFT size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Get number of frequency bins (fft_size/2 + 1 for real FFT)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }
}

/// Add the per-bin power of a half-complex spectrum into `acc`
///
/// Uses `s = 4/N²` for interior bins and `s/4` for DC and Nyquist, so a
/// full-scale sine on a bin center reads 1.0.
pub fn accumulate_power(packed: &[f64], acc: &mut [f64]) {
    let n = packed.len();
    let half = n / 2;
    debug_assert_eq!(acc.len(), half + 1);

    let scaler = 4.0 / (n as f64 * n as f64);
    acc[0] += packed[0] * packed[0] * scaler / 4.0;
    for k in 1..half {
        let re = packed[2 * k - 1];
        let im = packed[2 * k];
        acc[k] += (re * re + im * im) * scaler;
    }
    acc[half] += packed[n - 1] * packed[n - 1] * scaler / 4.0;
}
