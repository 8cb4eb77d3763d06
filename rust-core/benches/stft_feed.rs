use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use live_spectrogram::audio::{SampleSource, SyntheticSource};
use live_spectrogram::axis::{AxisMapping, AxisScale};
use live_spectrogram::config::{AnalysisParameters, SignalSource};
use live_spectrogram::spectrogram::{LogAxisMode, Spectrogram};
use live_spectrogram::spectrum::Stft;

fn one_second_of_noise(sample_rate: u32) -> Vec<i16> {
    let mut source = SyntheticSource::new(&SignalSource::WhiteNoise, sample_rate).unpaced();
    let mut samples = vec![0i16; sample_rate as usize];
    let _ = source.read(&mut samples);
    samples
}

fn bench_feed(c: &mut Criterion) {
    let samples = one_second_of_noise(16000);
    let mut group = c.benchmark_group("stft_feed");
    for fft_len in [1024usize, 4096, 16384] {
        let params = AnalysisParameters {
            fft_len,
            hop_len: fft_len / 2,
            ..Default::default()
        };
        let Ok(mut stft) = Stft::new(&params) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::from_parameter(fft_len), &samples, |b, samples| {
            b.iter(|| {
                stft.feed(black_box(samples)).ok();
                black_box(stft.spectrum_db()[1])
            })
        });
    }
    group.finish();
}

fn bench_spectrogram_fill(c: &mut Criterion) {
    let params = AnalysisParameters::default();
    let mut stft = match Stft::new(&params) {
        Ok(stft) => stft,
        Err(_) => return,
    };
    stft.feed(&one_second_of_noise(params.sample_rate)).ok();
    let row = stft.spectrum_db().to_vec();

    for mode in [LogAxisMode::FullRebuild, LogAxisMode::Segmented] {
        let Ok(axis) = AxisMapping::new(1200.0, 20.0, 8000.0, AxisScale::Log) else {
            return;
        };
        let Ok(mut spectrogram) = Spectrogram::for_params(&params, axis) else {
            return;
        };
        spectrogram.set_log_axis_mode(mode);
        c.bench_function(&format!("spectrogram_fill_{:?}", mode), |b| {
            b.iter(|| spectrogram.fill(black_box(&row)).ok())
        });
    }
}

criterion_group!(benches, bench_feed, bench_spectrogram_fill);
criterion_main!(benches);
