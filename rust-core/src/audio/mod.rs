//! Audio capture: devices, synthetic sources, overrun checks and recording

pub mod buffer;
pub mod capture;
pub mod input;
pub mod monitor;
pub mod source;
pub mod wav;

pub use buffer::AudioRingBuffer;
pub use capture::{AnalysisResults, AnalyzerSession, ResultsMailbox, SpectrumListener};
pub use input::{list_input_devices, AudioDeviceInfo, AudioError, AudioInput};
pub use monitor::OverrunMonitor;
pub use source::{open_source, DeviceSource, SampleSource, SyntheticSource};
pub use wav::WavSink;
