//! Short-time Fourier transform engine
//!
//! Consumes a mono PCM stream in arbitrary chunk sizes, cuts it into frames of
//! N samples every H samples, and averages the power spectra of successive
//! frames. The averaged spectrum is published on demand through
//! [`Stft::spectrum`] / [`Stft::spectrum_db`].
//!
//! Power is scaled so that a full-scale sine centered on a bin reads 0 dB:
//! interior bins use `s = 4/N²`, DC and Nyquist `s/4`.

use super::fft::{accumulate_power, FftEngine};
use super::weighting::a_weighting_factors;
use super::windows::Window;
use crate::config::AnalysisParameters;
use crate::error::Result;

/// Samples needed before the time-domain RMS is refreshed
const RMS_MIN_COUNT: usize = 8000 / 30;

/// Peaks below this level are not reported, 1/8 LSB of a 16-bit sample
fn peak_floor_db() -> f64 {
    20.0 * (0.125 / 32768.0_f64).log10()
}

/// Strongest spectral component
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Frequency in Hz, refined below bin resolution when possible
    pub freq: f64,
    /// Level in dB
    pub db: f64,
}

/// STFT processor with frame averaging
pub struct Stft {
    fft_len: usize,
    hop_len: usize,
    sample_rate: f64,

    window: Window,
    fft: FftEngine,

    /// Frame being filled
    frame: Vec<f64>,
    /// Write position in `frame`; negative means samples still to skip
    fill: isize,
    /// Windowed copy handed to the FFT
    scratch: Vec<f64>,

    /// Sum of frame powers since the last publish
    power_sum: Vec<f64>,
    n_analysed: usize,

    /// Published spectrum
    power_out: Vec<f64>,
    db_out: Vec<f64>,

    a_weighting: bool,
    dba_factor: Vec<f64>,
    /// Linear power multiplier per bin, from the calibration curve
    calib_factor: Option<Vec<f64>>,

    cum_rms: f64,
    cnt_rms: usize,
    out_rms: f64,
}

impl Stft {
    /// Create a new STFT engine
    ///
    /// # Arguments
    /// * `params` - Session parameters; sample rate, FFT length, hop, window,
    ///   A-weighting flag and calibration curve are used
    pub fn new(params: &AnalysisParameters) -> Result<Self> {
        params.validate()?;

        let n = params.fft_len;
        let bins = n / 2 + 1;
        let sample_rate = params.sample_rate as f64;

        let calib_factor = params.calibration.as_ref().map(|calib| {
            calib
                .bin_gains_db(n, sample_rate)
                .into_iter()
                .map(|g| 10.0_f64.powf(-g / 10.0))
                .collect()
        });

        Ok(Self {
            fft_len: n,
            hop_len: params.hop_len,
            sample_rate,
            window: Window::new(params.window, n),
            fft: FftEngine::new(n)?,
            frame: vec![0.0; n],
            fill: 0,
            scratch: vec![0.0; n],
            power_sum: vec![0.0; bins],
            n_analysed: 0,
            power_out: vec![0.0; bins],
            db_out: vec![f64::NEG_INFINITY; bins],
            a_weighting: params.a_weighting,
            dba_factor: a_weighting_factors(n, sample_rate),
            calib_factor,
            cum_rms: 0.0,
            cnt_rms: 0,
            out_rms: 0.0,
        })
    }

    /// Feed 16-bit PCM samples
    pub fn feed(&mut self, samples: &[i16]) -> Result<()> {
        for &s in samples {
            self.push(s as f64 / 32768.0)?;
        }
        Ok(())
    }

    /// Feed samples already normalized to [-1, 1)
    pub fn feed_normalized(&mut self, samples: &[f64]) -> Result<()> {
        for &s in samples {
            self.push(s)?;
        }
        Ok(())
    }

    fn push(&mut self, s: f64) -> Result<()> {
        self.cum_rms += s * s;
        self.cnt_rms += 1;

        if self.fill < 0 {
            self.fill += 1;
            return Ok(());
        }

        self.frame[self.fill as usize] = s;
        self.fill += 1;
        if self.fill as usize == self.fft_len {
            self.analyse_frame()?;
        }
        Ok(())
    }

    fn analyse_frame(&mut self) -> Result<()> {
        self.window.apply_into(&self.frame, &mut self.scratch);
        self.fft.forward_half_complex(&mut self.scratch)?;
        accumulate_power(&self.scratch, &mut self.power_sum);
        self.n_analysed += 1;

        if self.hop_len < self.fft_len {
            self.frame.copy_within(self.hop_len.., 0);
        }
        self.fill = self.fft_len as isize - self.hop_len as isize;
        Ok(())
    }

    /// Frames accumulated since the spectrum was last published
    pub fn frames_ready(&self) -> usize {
        self.n_analysed
    }

    fn publish(&mut self) {
        if self.n_analysed == 0 {
            return;
        }

        let k = self.n_analysed as f64;
        for (i, (out, sum)) in self
            .power_out
            .iter_mut()
            .zip(self.power_sum.iter_mut())
            .enumerate()
        {
            let mut p = *sum / k;
            if let Some(calib) = &self.calib_factor {
                p *= calib[i];
            }
            if self.a_weighting {
                p *= self.dba_factor[i];
            }
            *out = p;
            *sum = 0.0;
        }
        self.n_analysed = 0;

        for (db, &p) in self.db_out.iter_mut().zip(self.power_out.iter()) {
            *db = 10.0 * p.log10();
        }
    }

    /// Averaged power spectrum, `N/2 + 1` bins
    ///
    /// Publishes the frames accumulated so far. Without new frames the
    /// previous result is returned unchanged.
    pub fn spectrum(&mut self) -> &[f64] {
        self.publish();
        &self.power_out
    }

    /// Averaged spectrum in dB, `10·log10(power)`
    pub fn spectrum_db(&mut self) -> &[f64] {
        self.publish();
        &self.db_out
    }

    /// Time-domain RMS, normalized so a sine of amplitude A reads A
    ///
    /// The value is refreshed only once enough samples have been seen.
    pub fn rms(&mut self) -> f64 {
        if self.cnt_rms > RMS_MIN_COUNT {
            self.out_rms = (self.cum_rms / self.cnt_rms as f64 * 2.0).sqrt();
            self.cum_rms = 0.0;
            self.cnt_rms = 0;
        }
        self.out_rms
    }

    /// RMS integrated from the published spectrum, DC excluded
    pub fn rms_from_ft(&mut self) -> f64 {
        self.publish();
        let s: f64 = self.power_out[1..].iter().sum();
        (s * self.window.energy_factor()).sqrt()
    }

    /// Locate the strongest non-DC bin, with quadratic sub-bin refinement
    pub fn calculate_peak(&mut self) -> Peak {
        self.publish();

        let mut peak_db = peak_floor_db();
        let mut peak_bin = 0usize;
        for (i, &db) in self.db_out.iter().enumerate().skip(1) {
            if db > peak_db {
                peak_db = db;
                peak_bin = i;
            }
        }

        let bin_width = self.bin_width();
        let mut peak_freq = peak_bin as f64 * bin_width;

        if bin_width < peak_freq && peak_freq < self.sample_rate / 2.0 - bin_width {
            let x1 = self.db_out[peak_bin - 1];
            let x2 = self.db_out[peak_bin];
            let x3 = self.db_out[peak_bin + 1];
            let c = x2;
            let a = (x3 + x1) / 2.0 - x2;
            let b = (x3 - x1) / 2.0;
            if a < 0.0 {
                let offset = -b / (2.0 * a);
                if offset.abs() < 1.0 {
                    peak_freq += offset * bin_width;
                    peak_db = (4.0 * a * c - b * b) / (4.0 * a);
                }
            }
        }

        Peak {
            freq: peak_freq,
            db: peak_db,
        }
    }

    pub fn set_a_weighting(&mut self, enabled: bool) {
        self.a_weighting = enabled;
    }

    pub fn a_weighting(&self) -> bool {
        self.a_weighting
    }

    /// Drop partial frames, accumulated power and the published result
    pub fn clear(&mut self) {
        self.fill = 0;
        self.frame.fill(0.0);
        self.power_sum.fill(0.0);
        self.n_analysed = 0;
        self.power_out.fill(0.0);
        self.db_out.fill(f64::NEG_INFINITY);
        self.cum_rms = 0.0;
        self.cnt_rms = 0;
        self.out_rms = 0.0;
    }

    pub fn fft_len(&self) -> usize {
        self.fft_len
    }

    pub fn hop_len(&self) -> usize {
        self.hop_len
    }

    pub fn num_bins(&self) -> usize {
        self.fft_len / 2 + 1
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Bin spacing in Hz
    pub fn bin_width(&self) -> f64 {
        self.sample_rate / self.fft_len as f64
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}
