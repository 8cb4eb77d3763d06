//! Capture loop and session control
//!
//! The hot loop stays in Rust: one thread reads the source, checks for
//! overruns, optionally records, feeds the STFT and publishes every averaged
//! spectrum to a `SpectrumListener` and the attached spectrogram. The caller
//! only toggles flags and reads results.

use super::monitor::OverrunMonitor;
use super::source::{open_source, SampleSource};
use super::wav::WavSink;
use crate::config::AnalysisParameters;
use crate::error::{AnalyzerError, Result};
use crate::spectrogram::SharedSpectrogram;
use crate::spectrum::{Peak, Stft};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Receiver of capture results
///
/// Every method is called on the capture thread; implementations marshal to
/// their own thread if needed.
pub trait SpectrumListener: Send + Sync {
    /// Averaged spectrum in dB, `N/2 + 1` bins
    fn on_spectrum(&self, _spectrum_db: &[f64]) {}

    fn on_peak(&self, _peak: Peak) {}

    /// Time-domain and spectrum-derived RMS
    fn on_rms(&self, _rms: f64, _rms_from_ft: f64) {}

    /// A buffer overrun was detected; at most once per check interval
    fn on_overrun(&self) {}

    fn on_recording_progress(&self, _seconds_written: f64, _seconds_left: f64) {}

    fn on_wav_saved(&self, _path: &Path) {}

    /// The loop hit an error it cannot continue from
    fn on_error(&self, _error: &AnalyzerError) {}
}

/// One published analysis result
#[derive(Debug, Clone, Default)]
pub struct AnalysisResults {
    pub spectrum_db: Vec<f64>,
    pub peak: Option<Peak>,
    pub rms: f64,
    pub rms_from_ft: f64,
    /// Results published since the session started
    pub sequence: u64,
}

/// Listener that keeps the latest results for polling
///
/// Results are assembled from `on_spectrum`, `on_peak` and `on_rms`, which
/// the loop always calls in that order.
#[derive(Debug, Default)]
pub struct ResultsMailbox {
    building: Mutex<AnalysisResults>,
    latest: Mutex<Option<AnalysisResults>>,
    published: AtomicU64,
    overruns: AtomicU64,
    recording: Mutex<Option<(f64, f64)>>,
    saved: Mutex<Option<PathBuf>>,
    error: Mutex<Option<String>>,
}

impl ResultsMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest results, if any arrived since the last call
    pub fn take_results(&self) -> Option<AnalysisResults> {
        self.latest.lock().ok().and_then(|mut latest| latest.take())
    }

    /// Number of results published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    pub fn overrun_count(&self) -> u64 {
        self.overruns.load(Ordering::SeqCst)
    }

    /// Seconds written and seconds left in the current recording
    pub fn recording_progress(&self) -> Option<(f64, f64)> {
        self.recording.lock().ok().and_then(|r| *r)
    }

    pub fn saved_wav(&self) -> Option<PathBuf> {
        self.saved.lock().ok().and_then(|s| s.clone())
    }

    pub fn take_error(&self) -> Option<String> {
        self.error.lock().ok().and_then(|mut e| e.take())
    }
}

impl SpectrumListener for ResultsMailbox {
    fn on_spectrum(&self, spectrum_db: &[f64]) {
        if let Ok(mut building) = self.building.lock() {
            building.spectrum_db.clear();
            building.spectrum_db.extend_from_slice(spectrum_db);
        }
    }

    fn on_peak(&self, peak: Peak) {
        if let Ok(mut building) = self.building.lock() {
            building.peak = Some(peak);
        }
    }

    fn on_rms(&self, rms: f64, rms_from_ft: f64) {
        let sequence = self.published.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut building) = self.building.lock() {
            building.rms = rms;
            building.rms_from_ft = rms_from_ft;
            building.sequence = sequence;
            if let Ok(mut latest) = self.latest.lock() {
                *latest = Some(building.clone());
            }
        }
    }

    fn on_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::SeqCst);
    }

    fn on_recording_progress(&self, seconds_written: f64, seconds_left: f64) {
        if let Ok(mut recording) = self.recording.lock() {
            *recording = Some((seconds_written, seconds_left));
        }
    }

    fn on_wav_saved(&self, path: &Path) {
        if let Ok(mut saved) = self.saved.lock() {
            *saved = Some(path.to_path_buf());
        }
    }

    fn on_error(&self, error: &AnalyzerError) {
        if let Ok(mut slot) = self.error.lock() {
            *slot = Some(error.to_string());
        }
    }
}

/// Flags shared between the session and its capture thread
#[derive(Debug, Clone)]
struct Controls {
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    a_weighting: Arc<AtomicBool>,
    recording: Arc<AtomicBool>,
}

/// State owned by the capture thread
struct CaptureLoop {
    params: AnalysisParameters,
    stft: Stft,
    monitor: OverrunMonitor,
    listener: Arc<dyn SpectrumListener>,
    spectrogram: Arc<Mutex<Option<SharedSpectrogram>>>,
    controls: Controls,
    wav: Option<WavSink>,
    seconds_left: f64,
    spectrum_copy: Vec<f64>,
}

impl CaptureLoop {
    fn report(&self, error: AnalyzerError) {
        log::error!("Capture stopped: {}", error);
        self.listener.on_error(&error);
    }

    fn run(&mut self, source: &mut dyn SampleSource) {
        let chunk_len = self.params.read_chunk_size();
        let mut chunk = vec![0i16; chunk_len];
        log::info!(
            "Capture started from {}: {} Hz, chunk {} samples, buffer {} samples",
            source.describe(),
            self.params.sample_rate,
            chunk_len,
            self.monitor.buffer_size()
        );

        self.monitor.start();
        while self.controls.running.load(Ordering::SeqCst) {
            let n = match source.read(&mut chunk) {
                Ok(n) => n,
                Err(e) => {
                    self.report(e.into());
                    break;
                }
            };
            if let Err(e) = self.process(&chunk[..n]) {
                self.report(e);
                break;
            }
        }

        log::info!(
            "Capture stopped, measured sample rate {:.2} Hz",
            self.monitor.sample_rate_estimate()
        );
        self.finish_recording();
        self.controls.running.store(false, Ordering::SeqCst);
    }

    fn process(&mut self, samples: &[i16]) -> Result<()> {
        if self.monitor.update(samples.len()) {
            if self.monitor.last_check_overrun() {
                self.listener.on_overrun();
            }
            if let Some(wav) = &self.wav {
                self.seconds_left = wav.seconds_left();
            }
        }

        self.sync_recording()?;
        if let Some(wav) = self.wav.as_mut() {
            wav.push(samples)?;
            self.listener
                .on_recording_progress(wav.seconds_written(), self.seconds_left);
        }

        // Keep reading while paused so overrun checks and recording stay valid
        if self.controls.paused.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.stft
            .set_a_weighting(self.controls.a_weighting.load(Ordering::SeqCst));
        self.stft.feed(samples)?;
        if self.stft.frames_ready() >= self.params.n_average {
            self.publish();
        }
        Ok(())
    }

    fn publish(&mut self) {
        self.spectrum_copy.clear();
        self.spectrum_copy.extend_from_slice(self.stft.spectrum_db());
        let peak = self.stft.calculate_peak();
        let rms = self.stft.rms();
        let rms_from_ft = self.stft.rms_from_ft();

        self.listener.on_spectrum(&self.spectrum_copy);
        self.listener.on_peak(peak);
        self.listener.on_rms(rms, rms_from_ft);

        let spectrogram = self.spectrogram.lock().ok().and_then(|s| s.clone());
        if let Some(spectrogram) = spectrogram {
            if let Err(e) = spectrogram.fill(&self.spectrum_copy) {
                log::warn!("Spectrogram not updated: {}", e);
            }
        }
    }

    /// Open or close the WAV sink to follow the recording flag
    fn sync_recording(&mut self) -> Result<()> {
        let wanted = self.controls.recording.load(Ordering::SeqCst);
        if wanted && self.wav.is_none() {
            let wav = WavSink::create_in(&self.params.recording_dir, self.params.sample_rate)?;
            self.seconds_left = wav.seconds_left();
            self.wav = Some(wav);
        } else if !wanted && self.wav.is_some() {
            self.finish_recording();
        }
        Ok(())
    }

    fn finish_recording(&mut self) {
        if let Some(wav) = self.wav.take() {
            match wav.finalize() {
                Ok(path) => self.listener.on_wav_saved(&path),
                Err(e) => self.listener.on_error(&e),
            }
        }
    }
}

/// One analysis session: parameters, listener and the capture thread
pub struct AnalyzerSession {
    params: AnalysisParameters,
    listener: Arc<dyn SpectrumListener>,
    spectrogram: Arc<Mutex<Option<SharedSpectrogram>>>,
    controls: Controls,
    capture_thread: Option<JoinHandle<()>>,
}

impl AnalyzerSession {
    /// Create a stopped session
    ///
    /// # Arguments
    /// * `params` - Validated immediately
    /// * `listener` - Receives results on the capture thread
    pub fn new(params: AnalysisParameters, listener: Arc<dyn SpectrumListener>) -> Result<Self> {
        params.validate()?;
        let controls = Controls {
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            a_weighting: Arc::new(AtomicBool::new(params.a_weighting)),
            recording: Arc::new(AtomicBool::new(false)),
        };

        Ok(Self {
            params,
            listener,
            spectrogram: Arc::new(Mutex::new(None)),
            controls,
            capture_thread: None,
        })
    }

    /// Replace the parameters, restarting capture if it was running
    pub fn configure(&mut self, params: AnalysisParameters) -> Result<()> {
        params.validate()?;
        let was_running = self.is_running();
        self.stop();
        self.controls
            .a_weighting
            .store(params.a_weighting, Ordering::SeqCst);
        self.params = params;
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    /// Start capturing from the configured source
    ///
    /// Configuration errors are returned here; device errors are reported
    /// through `SpectrumListener::on_error` from the capture thread.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let mut capture = self.prepare()?;
        let running = Arc::clone(&self.controls.running);
        running.store(true, Ordering::SeqCst);

        let spawned = std::thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                let source = &capture.params.source;
                let opened = open_source(source, capture.params.sample_rate, capture.params.buffer_sample_size());
                match opened {
                    Ok(mut source) => capture.run(source.as_mut()),
                    Err(e) => {
                        capture.report(e.into());
                        capture.controls.running.store(false, Ordering::SeqCst);
                    }
                }
            });
        self.finish_spawn(spawned)
    }

    /// Start capturing from a caller-supplied source
    pub fn start_with_source(&mut self, mut source: Box<dyn SampleSource + Send>) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let mut capture = self.prepare()?;
        self.controls.running.store(true, Ordering::SeqCst);

        let spawned = std::thread::Builder::new()
            .name("capture".into())
            .spawn(move || capture.run(source.as_mut()));
        self.finish_spawn(spawned)
    }

    fn prepare(&mut self) -> Result<CaptureLoop> {
        // Reap a thread that ended on its own
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }

        let stft = Stft::new(&self.params)?;
        let monitor = OverrunMonitor::new(self.params.sample_rate, self.params.buffer_sample_size());
        Ok(CaptureLoop {
            spectrum_copy: Vec::with_capacity(stft.num_bins()),
            params: self.params.clone(),
            stft,
            monitor,
            listener: Arc::clone(&self.listener),
            spectrogram: Arc::clone(&self.spectrogram),
            controls: self.controls.clone(),
            wav: None,
            seconds_left: 0.0,
        })
    }

    fn finish_spawn(&mut self, spawned: std::io::Result<JoinHandle<()>>) -> Result<()> {
        match spawned {
            Ok(handle) => {
                self.capture_thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.controls.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Pause or resume analysis; reading and recording continue
    pub fn pause(&self, paused: bool) {
        self.controls.paused.store(paused, Ordering::SeqCst);
    }

    /// Stop capture, finishing the read in progress
    pub fn stop(&mut self) {
        self.controls.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
    }

    pub fn set_a_weighting(&self, enabled: bool) {
        self.controls.a_weighting.store(enabled, Ordering::SeqCst);
    }

    /// Start or stop recording to `recording_dir`
    pub fn set_recording(&self, enabled: bool) {
        self.controls.recording.store(enabled, Ordering::SeqCst);
    }

    /// Feed every published spectrum into `spectrogram`
    pub fn attach_spectrogram(&self, spectrogram: SharedSpectrogram) {
        if let Ok(mut slot) = self.spectrogram.lock() {
            *slot = Some(spectrogram);
        }
    }

    pub fn detach_spectrogram(&self) {
        if let Ok(mut slot) = self.spectrogram.lock() {
            *slot = None;
        }
    }

    pub fn is_running(&self) -> bool {
        self.controls.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.controls.paused.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.controls.recording.load(Ordering::SeqCst)
    }

    pub fn params(&self) -> &AnalysisParameters {
        &self.params
    }
}

impl Drop for AnalyzerSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::input::AudioError;
    use std::time::{Duration, Instant};

    /// Source that fails after a number of reads
    struct FailingSource {
        reads_left: usize,
    }

    impl SampleSource for FailingSource {
        fn read(&mut self, buf: &mut [i16]) -> std::result::Result<usize, AudioError> {
            if self.reads_left == 0 {
                return Err(AudioError::ReadTimeout(2000));
            }
            self.reads_left -= 1;
            buf.fill(0);
            Ok(buf.len())
        }

        fn sample_rate(&self) -> u32 {
            8000
        }

        fn describe(&self) -> String {
            "failing".into()
        }
    }

    fn small_params() -> AnalysisParameters {
        AnalysisParameters {
            sample_rate: 8000,
            fft_len: 1024,
            hop_len: 512,
            ..Default::default()
        }
    }

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn test_mailbox_assembles_results() {
        let mailbox = ResultsMailbox::new();
        assert!(mailbox.take_results().is_none());

        mailbox.on_spectrum(&[-10.0, -20.0]);
        mailbox.on_peak(Peak { freq: 100.0, db: -10.0 });
        assert!(mailbox.take_results().is_none());
        mailbox.on_rms(0.5, 0.4);

        let results = mailbox.take_results().unwrap();
        assert_eq!(results.spectrum_db, vec![-10.0, -20.0]);
        assert_eq!(results.peak.unwrap().freq, 100.0);
        assert_eq!(results.sequence, 1);
        assert!(mailbox.take_results().is_none());

        mailbox.on_overrun();
        mailbox.on_overrun();
        assert_eq!(mailbox.overrun_count(), 2);
    }

    #[test]
    fn test_invalid_params_rejected_synchronously() {
        let params = AnalysisParameters {
            fft_len: 1000,
            ..Default::default()
        };
        let mailbox = Arc::new(ResultsMailbox::new());
        assert!(matches!(
            AnalyzerSession::new(params, mailbox),
            Err(AnalyzerError::InvalidFftLength(1000))
        ));
    }

    #[test]
    fn test_read_error_ends_loop_and_reports() {
        let mailbox = Arc::new(ResultsMailbox::new());
        let mut session = AnalyzerSession::new(small_params(), mailbox.clone()).unwrap();
        session
            .start_with_source(Box::new(FailingSource { reads_left: 4 }))
            .unwrap();

        assert!(wait_until(Duration::from_secs(2), || !session.is_running()));
        session.stop();
        let error = mailbox.take_error().unwrap();
        assert!(error.contains("stalled"), "{}", error);
        // Four chunks of zeros are enough for one averaged spectrum
        assert!(mailbox.published() >= 1);
    }

    #[test]
    fn test_restart_after_failure() {
        let mailbox = Arc::new(ResultsMailbox::new());
        let mut session = AnalyzerSession::new(small_params(), mailbox.clone()).unwrap();
        session
            .start_with_source(Box::new(FailingSource { reads_left: 0 }))
            .unwrap();
        assert!(wait_until(Duration::from_secs(2), || !session.is_running()));

        session
            .start_with_source(Box::new(FailingSource { reads_left: 1 }))
            .unwrap();
        assert!(wait_until(Duration::from_secs(2), || !session.is_running()));
        assert!(mailbox.take_error().is_some());
    }
}
