//! Audio input capture using cpal
//!
//! Opens an input device, down-mixes its frames to mono and hands the samples
//! to the capture thread through a ring buffer.

use super::buffer::AudioProducer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio input device found")]
    NoDevice,

    #[error("Input device '{0}' not found")]
    DeviceNotFound(String),

    #[error("Failed to get device name: {0}")]
    DeviceName(String),

    #[error("Failed to get default config: {0}")]
    DefaultConfig(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to build stream: {0}")]
    BuildStream(String),

    #[error("Failed to play stream: {0}")]
    PlayStream(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("No audio data for {0} ms, device stalled")]
    ReadTimeout(u64),

    #[error("Resampler error: {0}")]
    Resample(String),
}

/// Audio input device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    /// Rate the stream actually runs at
    pub sample_rate: u32,
    pub channels: u16,
}

/// Audio input stream
pub struct AudioInput {
    stream: Stream,
    device_info: AudioDeviceInfo,
    stream_error: Arc<Mutex<Option<String>>>,
}

/// Find an input device by name, or the host default
pub fn find_input_device(name: Option<&str>) -> Result<Device, AudioError> {
    let host = cpal::default_host();
    match name {
        None => host.default_input_device().ok_or(AudioError::NoDevice),
        Some(wanted) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::DeviceName(e.to_string()))?;
            for device in devices {
                if device.name().map(|n| n == wanted).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::DeviceNotFound(wanted.to_string()))
        }
    }
}

impl AudioInput {
    /// Open the default (or named) input device
    ///
    /// # Arguments
    /// * `name` - Device name, `None` for the host default
    /// * `sample_rate` - Preferred rate; the device default is used if unsupported
    /// * `producer` - Ring buffer producer for captured mono audio
    pub fn open(name: Option<&str>, sample_rate: u32, producer: AudioProducer) -> Result<Self, AudioError> {
        let device = find_input_device(name)?;
        Self::from_device(device, sample_rate, producer)
    }

    /// Create audio input from specific device
    pub fn from_device(device: Device, sample_rate: u32, producer: AudioProducer) -> Result<Self, AudioError> {
        let name = device
            .name()
            .map_err(|e| AudioError::DeviceName(e.to_string()))?;

        let default_config = device
            .default_input_config()
            .map_err(|e| AudioError::DefaultConfig(e.to_string()))?;

        // Prefer the requested rate with the default channel count and format
        let supports_rate = device
            .supported_input_configs()
            .map(|mut configs| {
                configs.any(|c| {
                    c.channels() == default_config.channels()
                        && c.sample_format() == default_config.sample_format()
                        && c.min_sample_rate().0 <= sample_rate
                        && sample_rate <= c.max_sample_rate().0
                })
            })
            .unwrap_or(false);

        let sample_format = default_config.sample_format();
        let mut stream_config: StreamConfig = default_config.into();
        if supports_rate {
            stream_config.sample_rate = SampleRate(sample_rate);
        } else {
            log::info!(
                "Device '{}' cannot run at {} Hz, using {} Hz",
                name,
                sample_rate,
                stream_config.sample_rate.0
            );
        }

        let device_info = AudioDeviceInfo {
            name,
            sample_rate: stream_config.sample_rate.0,
            channels: stream_config.channels,
        };

        let stream_error = Arc::new(Mutex::new(None));
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, producer, &stream_error)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, producer, &stream_error)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, producer, &stream_error)?,
            SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, producer, &stream_error)?,
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        };

        Ok(Self {
            stream,
            device_info,
            stream_error,
        })
    }

    /// Start capturing audio
    pub fn start(&self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Pause audio capture
    pub fn pause(&self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Get device information
    pub fn device_info(&self) -> &AudioDeviceInfo {
        &self.device_info
    }

    /// Error reported by the stream callback, if any
    pub fn take_error(&self) -> Option<AudioError> {
        self.stream_error
            .lock()
            .ok()
            .and_then(|mut e| e.take())
            .map(AudioError::Stream)
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    stream_error: &Arc<Mutex<Option<String>>>,
) -> Result<Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let error_slot = Arc::clone(stream_error);
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Average interleaved channels down to mono
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
                    sum / frame.len() as f32
                }));
                producer.write(&mono);
            },
            move |err| {
                log::error!("Audio input error: {}", err);
                if let Ok(mut slot) = error_slot.lock() {
                    *slot = Some(err.to_string());
                }
            },
            None,
        )
        .map_err(|e| AudioError::BuildStream(e.to_string()))
}

/// List available audio input devices
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let device_iter = host
        .input_devices()
        .map_err(|e| AudioError::DeviceName(e.to_string()))?;

    for device in device_iter {
        if let Ok(name) = device.name() {
            if let Ok(config) = device.default_input_config() {
                devices.push(AudioDeviceInfo {
                    name,
                    sample_rate: config.sample_rate().0,
                    channels: config.channels(),
                });
            }
        }
    }

    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices() {
        // Just ensure it doesn't crash
        let _ = list_input_devices();
    }

    #[test]
    fn test_unknown_device_name() {
        match find_input_device(Some("no such device \u{1F3A4}")) {
            Err(AudioError::DeviceNotFound(name)) => assert!(name.starts_with("no such")),
            // Hosts without any input enumeration fail earlier
            Err(_) => {}
            Ok(_) => panic!("found a device that cannot exist"),
        }
    }
}
