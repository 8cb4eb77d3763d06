//! Mono 16-bit PCM recording of the capture stream

use crate::error::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

const HEADER_BYTES: u64 = 44;
const BYTES_PER_SAMPLE: u64 = 2;
/// RIFF size fields are 32-bit
const MAX_FILE_BYTES: u64 = u32::MAX as u64;

/// File name for a recording started now, e.g. `rec2024-03-01_14h05m09.120s.wav`
pub fn recording_file_name() -> String {
    chrono::Local::now()
        .format("rec%Y-%m-%d_%Hh%Mm%S%.3fs.wav")
        .to_string()
}

pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    path: PathBuf,
    sample_rate: u32,
    frames_written: u64,
}

impl WavSink {
    /// Create `path`; the header is patched with the real sizes on `finalize`
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&path, spec)?;
        log::info!("Recording to {}", path.display());

        Ok(Self {
            writer: Some(writer),
            path,
            sample_rate,
            frames_written: 0,
        })
    }

    /// Create a time-stamped recording inside `dir`, creating it if needed
    pub fn create_in(dir: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Self::create(dir.as_ref().join(recording_file_name()), sample_rate)
    }

    /// Append samples
    pub fn push(&mut self, samples: &[i16]) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            let mut pcm = writer.get_i16_writer(samples.len() as u32);
            for &s in samples {
                pcm.write_sample(s);
            }
            pcm.flush()?;
            self.frames_written += samples.len() as u64;
        }
        Ok(())
    }

    pub fn seconds_written(&self) -> f64 {
        self.frames_written as f64 / self.sample_rate as f64
    }

    /// Recording time left before the file hits the 4 GiB format limit
    pub fn seconds_left(&self) -> f64 {
        let used = HEADER_BYTES + self.frames_written * BYTES_PER_SAMPLE;
        let byte_rate = self.sample_rate as u64 * BYTES_PER_SAMPLE;
        if byte_rate == 0 {
            return 0.0;
        }
        MAX_FILE_BYTES.saturating_sub(used) as f64 / byte_rate as f64
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Patch the header sizes and close the file
    pub fn finalize(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        log::info!(
            "Saved {} ({:.1} s)",
            self.path.display(),
            self.seconds_written()
        );
        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("live-spectrogram-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_file_name_format() {
        let name = recording_file_name();
        assert!(name.starts_with("rec"));
        assert!(name.ends_with("s.wav"));
        // rec + yyyy-MM-dd_HHhMMmSS.SSSs + .wav
        assert_eq!(name.len(), "rec2024-01-01_00h00m00.000s.wav".len());
        assert!(name.contains('h') && name.contains('m'));
    }

    #[test]
    fn test_push_and_finalize() {
        let dir = temp_dir("wav");
        let mut sink = WavSink::create(dir.join("sink.wav"), 8000).unwrap();
        let samples: Vec<i16> = (0..4000).map(|i| (i % 200 - 100) as i16 * 300).collect();
        sink.push(&samples).unwrap();
        sink.push(&samples).unwrap();
        assert!((sink.seconds_written() - 1.0).abs() < 1e-12);

        let path = sink.finalize().unwrap();
        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 8000);
        let back: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(&back[..4000], &samples[..]);

        let bytes = std::fs::metadata(&path).unwrap().len();
        assert_eq!(bytes, 44 + 16000);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_seconds_left_bounded_by_format() {
        let dir = temp_dir("wav-left");
        let mut sink = WavSink::create_in(&dir, 16000).unwrap();
        let full = sink.seconds_left();
        assert!((full - (u32::MAX as f64 - 44.0) / 32000.0).abs() < 1e-6);

        sink.push(&[0; 16000]).unwrap();
        assert!((full - sink.seconds_left() - 1.0).abs() < 1e-9);
        let path = sink.finalize().unwrap();
        assert_eq!(path.parent(), Some(dir.as_path()));
        std::fs::remove_dir_all(dir).ok();
    }
}
