//! Sample sources for the capture loop
//!
//! Everything the loop reads from implements `SampleSource`: a live input
//! device, or a synthetic generator paced to real time so it behaves like one.

use super::buffer::{AudioConsumer, AudioRingBuffer};
use super::input::{AudioError, AudioInput};
use crate::config::{SignalSource, SAMPLE_VALUE_MAX};
use rand::Rng;
use rubato::{FftFixedIn, Resampler};
use std::f64::consts::PI;
use std::time::{Duration, Instant};

/// How long a device read may wait before the device counts as stalled
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Blocking reader of mono 16-bit samples
///
/// Not `Send`: device streams stay on the thread that opened them.
pub trait SampleSource {
    /// Fill `buf`, returning the number of samples written
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, AudioError>;

    /// Rate of the delivered samples in Hz
    fn sample_rate(&self) -> u32;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Open the source described by `source` at `sample_rate`
///
/// # Arguments
/// * `source` - Device or synthetic signal
/// * `sample_rate` - Rate the analyzer expects
/// * `buffer_size` - Device ring buffer capacity in samples
pub fn open_source(
    source: &SignalSource,
    sample_rate: u32,
    buffer_size: usize,
) -> Result<Box<dyn SampleSource>, AudioError> {
    match source {
        SignalSource::Device { name } => Ok(Box::new(DeviceSource::open(
            name.as_deref(),
            sample_rate,
            buffer_size,
        )?)),
        synthetic => Ok(Box::new(SyntheticSource::new(synthetic, sample_rate))),
    }
}

/// Recursive sine oscillator, `y[n] = 2cos(w) y[n-1] - y[n-2]`
#[derive(Debug, Clone)]
pub struct SineGenerator {
    k: f64,
    n0: f64,
    n1: f64,
}

impl SineGenerator {
    /// # Arguments
    /// * `freq` - Frequency in Hz
    /// * `sample_rate` - Sample rate in Hz
    /// * `amplitude` - Peak value
    pub fn new(freq: f64, sample_rate: f64, amplitude: f64) -> Self {
        let w = 2.0 * PI * freq / sample_rate;
        Self {
            k: 2.0 * w.cos(),
            n0: 0.0,
            n1: amplitude * (w + PI / 2.0).cos(),
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        let s = self.k * self.n1 - self.n0;
        self.n0 = self.n1;
        self.n1 = s;
        s
    }

    /// Add the next `out.len()` samples onto `out`
    pub fn add_samples(&mut self, out: &mut [f64]) {
        for o in out {
            *o += self.next_sample();
        }
    }
}

/// Sleep-until-deadline pacing on a monotonic clock
#[derive(Debug, Clone)]
pub struct Pacer {
    deadline: Instant,
}

impl Pacer {
    pub fn new() -> Self {
        Self {
            deadline: Instant::now(),
        }
    }

    /// Wait until `period` after the previous deadline
    ///
    /// If the deadline already passed, resynchronize to now instead of
    /// trying to catch up.
    pub fn wait(&mut self, period: Duration) {
        self.deadline += period;
        let now = Instant::now();
        if self.deadline > now {
            std::thread::sleep(self.deadline - now);
        } else {
            self.deadline = now;
        }
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
enum Signal {
    Sines(Vec<SineGenerator>),
    WhiteNoise,
}

/// Test signal generator
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    signal: Signal,
    sample_rate: u32,
    scratch: Vec<f64>,
    pacer: Option<Pacer>,
    label: String,
}

fn amplitude(db: f64) -> f64 {
    SAMPLE_VALUE_MAX * 10f64.powf(db / 20.0)
}

impl SyntheticSource {
    /// Generator paced to real time
    ///
    /// A `Device` source yields silence; callers route devices through
    /// `DeviceSource` instead.
    pub fn new(source: &SignalSource, sample_rate: u32) -> Self {
        let sr = sample_rate as f64;
        let signal = match *source {
            SignalSource::Sine { freq, db } => Signal::Sines(vec![SineGenerator::new(freq, sr, amplitude(db))]),
            SignalSource::DualSine {
                freq1,
                db1,
                freq2,
                db2,
            } => Signal::Sines(vec![
                SineGenerator::new(freq2, sr, amplitude(db2)),
                SineGenerator::new(freq1, sr, amplitude(db1)),
            ]),
            SignalSource::WhiteNoise => Signal::WhiteNoise,
            SignalSource::Device { .. } => Signal::Sines(Vec::new()),
        };

        Self {
            signal,
            sample_rate,
            scratch: Vec::new(),
            pacer: Some(Pacer::new()),
            label: format!("{:?}", source),
        }
    }

    /// Produce samples as fast as they are read
    pub fn unpaced(mut self) -> Self {
        self.pacer = None;
        self
    }
}

impl SampleSource for SyntheticSource {
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, AudioError> {
        match &mut self.signal {
            Signal::Sines(generators) => {
                self.scratch.clear();
                self.scratch.resize(buf.len(), 0.0);
                for generator in generators.iter_mut() {
                    generator.add_samples(&mut self.scratch);
                }
                for (b, &s) in buf.iter_mut().zip(&self.scratch) {
                    *b = s.round() as i16;
                }
            }
            Signal::WhiteNoise => {
                let mut rng = rand::thread_rng();
                for b in buf.iter_mut() {
                    *b = (SAMPLE_VALUE_MAX * (2.0 * rng.gen::<f64>() - 1.0)) as i16;
                }
            }
        }

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait(Duration::from_secs_f64(buf.len() as f64 / self.sample_rate as f64));
        }
        Ok(buf.len())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

const RESAMPLER_CHUNK: usize = 1024;

/// Live input device
pub struct DeviceSource {
    input: AudioInput,
    consumer: AudioConsumer,
    sample_rate: u32,
    resampler: Option<FftFixedIn<f32>>,
    device_block: Vec<f32>,
    /// Resampled samples not yet handed out
    pending: Vec<f32>,
    pending_pos: usize,
    dropped_seen: u64,
}

impl DeviceSource {
    /// Open and start the device
    ///
    /// When the device cannot run at `sample_rate`, its native stream is
    /// resampled.
    pub fn open(name: Option<&str>, sample_rate: u32, buffer_size: usize) -> Result<Self, AudioError> {
        let rb = AudioRingBuffer::new(buffer_size.max(RESAMPLER_CHUNK * 4));
        let (producer, consumer) = rb.split();

        let input = AudioInput::open(name, sample_rate, producer)?;
        let info = input.device_info().clone();

        let resampler = if info.sample_rate != sample_rate {
            log::info!(
                "Resampling '{}' from {} Hz to {} Hz",
                info.name,
                info.sample_rate,
                sample_rate
            );
            Some(
                FftFixedIn::<f32>::new(
                    info.sample_rate as usize,
                    sample_rate as usize,
                    RESAMPLER_CHUNK,
                    2,
                    1,
                )
                .map_err(|e| AudioError::Resample(e.to_string()))?,
            )
        } else {
            None
        };

        input.start()?;
        log::info!(
            "Input device '{}' started: {} Hz, {} channel(s)",
            info.name,
            info.sample_rate,
            info.channels
        );

        Ok(Self {
            input,
            consumer,
            sample_rate,
            resampler,
            device_block: Vec::new(),
            pending: Vec::new(),
            pending_pos: 0,
            dropped_seen: 0,
        })
    }

    fn read_device(&mut self, n: usize) -> Result<(), AudioError> {
        self.device_block.resize(n, 0.0);
        let got = self.consumer.read_exact_timeout(&mut self.device_block, READ_TIMEOUT);
        if let Some(err) = self.input.take_error() {
            return Err(err);
        }
        if got < n {
            return Err(AudioError::ReadTimeout(READ_TIMEOUT.as_millis() as u64));
        }

        let dropped = self.consumer.dropped();
        if dropped > self.dropped_seen {
            log::debug!("Input callback dropped {} samples", dropped - self.dropped_seen);
            self.dropped_seen = dropped;
        }
        Ok(())
    }

    /// Resample one device block into `pending`
    fn refill(&mut self) -> Result<(), AudioError> {
        self.pending.clear();
        self.pending_pos = 0;

        let needed = self
            .resampler
            .as_ref()
            .map(|r| r.input_frames_next())
            .unwrap_or(RESAMPLER_CHUNK);
        self.read_device(needed)?;

        if let Some(resampler) = self.resampler.as_mut() {
            let out = resampler
                .process(&[&self.device_block[..]], None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            if let Some(channel) = out.first() {
                self.pending.extend_from_slice(channel);
            }
        }
        Ok(())
    }
}

fn to_pcm(s: f32) -> i16 {
    (s as f64 * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

impl SampleSource for DeviceSource {
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, AudioError> {
        if self.resampler.is_none() {
            self.read_device(buf.len())?;
            for (b, &s) in buf.iter_mut().zip(&self.device_block) {
                *b = to_pcm(s);
            }
            return Ok(buf.len());
        }

        let mut filled = 0;
        while filled < buf.len() {
            if self.pending_pos >= self.pending.len() {
                self.refill()?;
            }
            let available = &self.pending[self.pending_pos..];
            let n = available.len().min(buf.len() - filled);
            for (b, &s) in buf[filled..filled + n].iter_mut().zip(available) {
                *b = to_pcm(s);
            }
            self.pending_pos += n;
            filled += n;
        }
        Ok(filled)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn describe(&self) -> String {
        self.input.device_info().name.clone()
    }
}

impl Drop for DeviceSource {
    fn drop(&mut self) {
        let _ = self.input.pause();
    }
}
