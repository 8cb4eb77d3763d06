//! Buffer overrun detection for the capture stream
//!
//! Compares the number of samples actually read against the number the wall
//! clock says should have arrived. A shortfall larger than the capture buffer
//! means samples were lost. The effective device rate is re-estimated as data
//! accumulates so a slightly fast or slow clock is not mistaken for loss.
//! Purely advisory: nothing here ever blocks the capture loop.

use std::time::Instant;

/// Milliseconds between two checks
pub const CHECK_INTERVAL_MS: u64 = 2000;

/// Relative drift of the estimated rate treated as a hardware problem
pub const RATE_TOLERANCE: f64 = 0.0145;

#[derive(Debug, Clone)]
pub struct OverrunMonitor {
    sample_rate: u32,
    buffer_size: usize,
    epoch: Instant,
    time_started: u64,
    time_checked: u64,
    last_overrun_time: Option<u64>,
    samples_read: u64,
    rate_estimate: f64,
    last_check_overrun: bool,
}

impl OverrunMonitor {
    /// Create a monitor
    ///
    /// # Arguments
    /// * `sample_rate` - Nominal rate of the stream in Hz
    /// * `buffer_size` - Capture buffer size in samples; the tolerated lag
    pub fn new(sample_rate: u32, buffer_size: usize) -> Self {
        Self {
            sample_rate,
            buffer_size,
            epoch: Instant::now(),
            time_started: 0,
            time_checked: 0,
            last_overrun_time: None,
            samples_read: 0,
            rate_estimate: sample_rate as f64,
            last_check_overrun: false,
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Reset clock and counters
    pub fn start(&mut self) {
        let now = self.now_ms();
        self.start_at(now);
    }

    /// Reset at an explicit monotonic time in ms
    pub fn start_at(&mut self, now_ms: u64) {
        self.samples_read = 0;
        self.last_overrun_time = None;
        self.last_check_overrun = false;
        self.time_started = now_ms;
        self.time_checked = now_ms;
        self.rate_estimate = self.sample_rate as f64;
    }

    /// Account for one read; returns whether a check ran
    pub fn update(&mut self, samples: usize) -> bool {
        let now = self.now_ms();
        self.update_at(samples, now)
    }

    /// Account for one read at an explicit time in ms
    pub fn update_at(&mut self, samples: usize, now_ms: u64) -> bool {
        if self.samples_read == 0 {
            // The first chunk started arriving one chunk ago
            let chunk_ms = samples as u64 * 1000 / self.sample_rate.max(1) as u64;
            self.time_started = now_ms.saturating_sub(chunk_ms);
        }
        self.samples_read += samples as u64;

        if self.time_checked + CHECK_INTERVAL_MS > now_ms {
            return false;
        }
        self.time_checked += CHECK_INTERVAL_MS;
        if self.time_checked + CHECK_INTERVAL_MS <= now_ms {
            // At most one check per interval after a stall
            self.time_checked = now_ms;
        }

        let elapsed = now_ms.saturating_sub(self.time_started);
        let expected = (elapsed as f64 * self.rate_estimate / 1000.0) as u64;
        let mut overrun = false;

        if expected > self.buffer_size as u64 + self.samples_read {
            log::warn!(
                "Buffer overrun: expected {} samples, read {} ({:.3} s behind) at {:.2} Hz, counter reset",
                expected,
                self.samples_read,
                (expected - self.samples_read) as f64 / self.rate_estimate,
                self.rate_estimate
            );
            self.last_overrun_time = Some(now_ms);
            self.samples_read = 0;
            overrun = true;
        }

        let nominal = self.sample_rate as f64;
        if self.samples_read > 10 * self.sample_rate as u64 && elapsed > 0 {
            let measured = self.samples_read as f64 * 1000.0 / elapsed as f64;
            self.rate_estimate = 0.9 * self.rate_estimate + 0.1 * measured;
            if (self.rate_estimate - nominal).abs() > RATE_TOLERANCE * nominal {
                log::warn!(
                    "Sample rate inaccurate, possible hardware problem: {:.2} Hz measured, {} Hz nominal",
                    self.rate_estimate,
                    self.sample_rate
                );
                self.samples_read = 0;
            }
        }

        self.last_check_overrun = overrun;
        true
    }

    /// Whether the most recent check found an overrun
    pub fn last_check_overrun(&self) -> bool {
        self.last_check_overrun
    }

    /// Time of the last overrun in ms, on the clock passed to `update_at`
    pub fn last_overrun_time(&self) -> Option<u64> {
        self.last_overrun_time
    }

    /// Smoothed effective sample rate
    pub fn sample_rate_estimate(&self) -> f64 {
        self.rate_estimate
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `chunk`-sample reads whose arrival is stretched by `slowdown`
    fn simulate(monitor: &mut OverrunMonitor, chunk: usize, slowdown: f64, seconds: u64) -> Vec<(u64, bool)> {
        let sr = 16000.0;
        let chunk_ms = chunk as f64 * 1000.0 / sr * slowdown;
        monitor.start_at(0);

        let mut checks = Vec::new();
        let mut k = 1;
        loop {
            let now = (k as f64 * chunk_ms) as u64;
            if now > seconds * 1000 {
                break;
            }
            if monitor.update_at(chunk, now) {
                checks.push((now, monitor.last_check_overrun()));
            }
            k += 1;
        }
        checks
    }

    #[test]
    fn test_nominal_rate_never_overruns() {
        let mut monitor = OverrunMonitor::new(16000, 16384);
        let checks = simulate(&mut monitor, 1000, 1.0, 10);
        assert_eq!(checks.len(), 5);
        assert!(checks.iter().all(|&(_, overrun)| !overrun));
        assert!((monitor.sample_rate_estimate() - 16000.0).abs() < 1.0);
    }

    #[test]
    fn test_half_rate_overruns_at_first_check() {
        let mut monitor = OverrunMonitor::new(16000, 8192);
        let checks = simulate(&mut monitor, 1024, 2.0, 3);
        assert_eq!(checks.len(), 1);
        assert!(checks[0].1);
        assert_eq!(monitor.last_overrun_time(), Some(checks[0].0));
    }

    #[test]
    fn test_half_rate_with_one_second_buffer() {
        // Lag crosses one second of audio just after the first check
        let mut monitor = OverrunMonitor::new(16000, 16384);
        let checks = simulate(&mut monitor, 1024, 2.0, 5);
        assert!(!checks[0].1);
        assert!(checks[1].1);
    }

    #[test]
    fn test_checks_are_throttled() {
        let mut monitor = OverrunMonitor::new(16000, 16384);
        monitor.start_at(0);
        assert!(!monitor.update_at(16, 1));
        assert!(!monitor.update_at(16, 1999));
        assert!(monitor.update_at(16, 2000));
        assert!(!monitor.update_at(16, 2001));

        // After a stall only one check fires
        assert!(monitor.update_at(16, 9000));
        assert!(!monitor.update_at(16, 9500));
        assert!(monitor.update_at(16, 11000));
    }

    #[test]
    fn test_fast_clock_is_flagged_as_rate_anomaly() {
        let mut monitor = OverrunMonitor::new(16000, 16384);
        // 5% too many samples per second
        simulate(&mut monitor, 1000, 1.0 / 1.05, 20);
        assert!(monitor.sample_rate_estimate() > 16000.0);
        assert!(!monitor.last_check_overrun());
    }
}
