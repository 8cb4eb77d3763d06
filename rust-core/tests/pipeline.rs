//! End-to-end analysis of synthetic signals, without threads

use live_spectrogram::audio::{OverrunMonitor, SampleSource, SyntheticSource, WavSink};
use live_spectrogram::axis::{AxisMapping, AxisScale};
use live_spectrogram::config::{AnalysisParameters, SignalSource};
use live_spectrogram::spectrogram::Spectrogram;
use live_spectrogram::spectrum::{Stft, WindowType};

fn params() -> AnalysisParameters {
    AnalysisParameters {
        sample_rate: 8000,
        fft_len: 1024,
        hop_len: 512,
        window: WindowType::Hanning,
        n_average: 2,
        ..Default::default()
    }
}

/// Read chunks until `n_average` frames are ready, then return the dB spectrum
fn analyse(source: &mut dyn SampleSource, params: &AnalysisParameters) -> (Stft, Vec<f64>) {
    let mut stft = Stft::new(params).unwrap();
    let mut chunk = vec![0i16; params.read_chunk_size()];
    while stft.frames_ready() < params.n_average {
        let n = source.read(&mut chunk).unwrap();
        stft.feed(&chunk[..n]).unwrap();
    }
    let db = stft.spectrum_db().to_vec();
    (stft, db)
}

#[test]
fn test_full_scale_sine_peaks_at_its_bin() {
    let params = params();
    let signal = SignalSource::Sine { freq: 1000.0, db: 0.0 };
    let mut source = SyntheticSource::new(&signal, params.sample_rate).unpaced();
    let (mut stft, db) = analyse(&mut source, &params);

    assert_eq!(db.len(), 513);
    let peak_bin = (1..db.len())
        .max_by(|&a, &b| db[a].total_cmp(&db[b]))
        .unwrap();
    assert_eq!(peak_bin, 128);
    assert!(db[128].abs() < 1.0, "peak level {}", db[128]);

    let peak = stft.calculate_peak();
    assert!((peak.freq - 1000.0).abs() < 1.0, "peak at {}", peak.freq);
    assert!(peak.db.abs() < 1.0);

    // Far from the tone the Hanning sidelobes are deep
    assert!(db[300] < -60.0);
}

#[test]
fn test_all_zero_input() {
    let params = params();
    let mut stft = Stft::new(&params).unwrap();
    stft.feed(&[0i16; 1536]).unwrap();
    assert_eq!(stft.frames_ready(), 2);

    assert!(stft.spectrum_db().iter().all(|&db| db == f64::NEG_INFINITY));
    assert_eq!(stft.rms(), 0.0);
    assert_eq!(stft.rms_from_ft(), 0.0);
    let peak = stft.calculate_peak();
    assert_eq!(peak.freq, 0.0);
}

#[test]
fn test_dual_sine_shows_both_tones() {
    let params = AnalysisParameters {
        window: WindowType::BlackmanHarris,
        ..params()
    };
    let signal = SignalSource::DualSine {
        freq1: 500.0,
        db1: -6.0,
        freq2: 2000.0,
        db2: -12.0,
    };
    let mut source = SyntheticSource::new(&signal, params.sample_rate).unpaced();
    let (_, db) = analyse(&mut source, &params);

    // 500 Hz and 2000 Hz land on bins 64 and 256
    assert!((db[64] + 6.0).abs() < 1.0, "{}", db[64]);
    assert!((db[256] + 12.0).abs() < 1.0, "{}", db[256]);
    assert!(db[160] < -60.0);
}

#[test]
fn test_spectra_fill_spectrogram() {
    let params = params();
    let axis = AxisMapping::new(800.0, 20.0, 4000.0, AxisScale::Log).unwrap();
    let mut spectrogram = Spectrogram::for_params(&params, axis).unwrap();
    assert_eq!(spectrogram.n_time(), 63);

    let signal = SignalSource::test_sine();
    let mut source = SyntheticSource::new(&signal, params.sample_rate).unpaced();
    let mut stft = Stft::new(&params).unwrap();
    let mut chunk = vec![0i16; params.read_chunk_size()];
    let mut rows = 0;
    while rows < 70 {
        source.read(&mut chunk).unwrap();
        stft.feed(&chunk).unwrap();
        if stft.frames_ready() >= params.n_average {
            spectrogram.fill(stft.spectrum_db()).unwrap();
            rows += 1;
        }
    }

    assert_eq!(spectrogram.history().pointer(), 70 % 63);
    let view = spectrogram.draw();
    assert_eq!(view.height, 63);
    // Shift mode shows the newest row last
    let newest = view.row(view.height - 1);
    assert!(newest.iter().any(|&p| p != 0 && p != 0xff000000));
}

#[test]
fn test_monitor_tracks_synthetic_stream() {
    let params = params();
    let mut monitor = OverrunMonitor::new(params.sample_rate, params.buffer_sample_size());
    monitor.start_at(0);

    // 512 samples every 64 ms for 6 s
    let mut checks = 0;
    for k in 1..=93u64 {
        if monitor.update_at(512, k * 64) {
            checks += 1;
            assert!(!monitor.last_check_overrun());
        }
    }
    assert_eq!(checks, 2);

    // A 3 s stall loses more than the buffer holds
    assert!(monitor.update_at(512, 9000));
    assert!(monitor.last_check_overrun());
}

#[test]
fn test_recorded_signal_round_trips() {
    let dir = std::env::temp_dir().join(format!("live-spectrogram-pipeline-{}", std::process::id()));
    let params = params();
    let signal = SignalSource::test_sine();
    let mut source = SyntheticSource::new(&signal, params.sample_rate).unpaced();

    let mut sink = WavSink::create_in(&dir, params.sample_rate).unwrap();
    let mut written = Vec::new();
    let mut chunk = vec![0i16; 512];
    for _ in 0..8 {
        source.read(&mut chunk).unwrap();
        sink.push(&chunk).unwrap();
        written.extend_from_slice(&chunk);
    }
    assert!((sink.seconds_written() - 0.512).abs() < 1e-12);
    let path = sink.finalize().unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, 8000);
    let back: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(back, written);
    std::fs::remove_dir_all(dir).ok();
}
