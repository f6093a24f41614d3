//! Audio device output.
//!
//! The cpal stream is owned by a dedicated thread for its whole life, since
//! streams are not `Send` on every host. The callback pulls samples from the
//! shared [`VoiceBank`].

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cadence_core::Settings;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, StreamConfig, SupportedBufferSize};
use parking_lot::Mutex;

use crate::error::SynthError;
use crate::voice_engine::VoiceBank;

/// Output device configuration.
#[derive(Debug, Clone)]
pub struct AudioOutputConfig {
    /// Audio device name (empty for default).
    pub device_name: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Buffer size in frames.
    pub buffer_size: u32,
}

impl Default for AudioOutputConfig {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            sample_rate: 48000,
            buffer_size: 512,
        }
    }
}

impl From<&Settings> for AudioOutputConfig {
    fn from(settings: &Settings) -> Self {
        let device_name = if settings.audio_device.eq_ignore_ascii_case("default") {
            String::new()
        } else {
            settings.audio_device.clone()
        };
        Self {
            device_name,
            sample_rate: settings.audio_sample_rate,
            buffer_size: settings.audio_buffer_size,
        }
    }
}

/// A running output stream.
pub struct AudioOutput {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
    channels: u16,
}

impl AudioOutput {
    /// Open the device and start pulling from `bank`.
    ///
    /// Blocks until the stream is playing or has failed to open.
    pub fn start(
        config: &AudioOutputConfig,
        bank: Arc<Mutex<VoiceBank>>,
    ) -> Result<Self, SynthError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), SynthError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let config = config.clone();

        let thread = std::thread::Builder::new()
            .name("cadence-audio".to_string())
            .spawn(move || {
                let stream = match open_stream(&config, bank) {
                    Ok((stream, rate, channels)) => {
                        let _ = ready_tx.send(Ok((rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until asked to stop or the owner goes away
                let _ = stop_rx.recv();
                drop(stream);
                log::info!("Audio output stopped");
            })
            .map_err(|e| SynthError::Stream(e.to_string()))?;

        let (sample_rate, channels) = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(SynthError::Stream(
                    "audio thread exited before the stream opened".to_string(),
                ));
            }
        };

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the stream and join the audio thread.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Audio thread panicked");
            }
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_stream(
    config: &AudioOutputConfig,
    bank: Arc<Mutex<VoiceBank>>,
) -> Result<(cpal::Stream, u32, u16), SynthError> {
    let device = find_device(&config.device_name)?;
    let stream_config = find_config(&device, config)?;

    let channels = stream_config.channels;
    let sample_rate = stream_config.sample_rate;
    bank.lock().set_sample_rate(sample_rate);

    log::info!(
        "Starting audio output: {} channels @ {} Hz",
        channels,
        sample_rate
    );

    let frame_channels = channels as usize;
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                bank.lock().render(data, frame_channels);
            },
            |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| SynthError::Stream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| SynthError::Stream(e.to_string()))?;

    Ok((stream, sample_rate, channels))
}

/// Find the output device by name, falling back to the default one.
fn find_device(device_name: &str) -> Result<Device, SynthError> {
    let host = cpal::default_host();

    if device_name.is_empty() {
        return host
            .default_output_device()
            .ok_or(SynthError::NoOutputDevice);
    }

    let devices = host
        .output_devices()
        .map_err(|e| SynthError::Device(e.to_string()))?;
    for device in devices {
        if let Ok(name) = device.name() {
            if name.contains(device_name) {
                log::info!("Found audio device: {}", name);
                return Ok(device);
            }
        }
    }

    log::warn!("Device '{}' not found, using default", device_name);
    host.default_output_device()
        .ok_or(SynthError::NoOutputDevice)
}

/// Pick an f32 config at the requested rate, or the device default.
fn find_config(device: &Device, config: &AudioOutputConfig) -> Result<StreamConfig, SynthError> {
    let supported_configs = device
        .supported_output_configs()
        .map_err(|e| SynthError::Device(e.to_string()))?;

    for config_range in supported_configs {
        if config_range.sample_format() != SampleFormat::F32 {
            continue;
        }
        let target_rate = config.sample_rate;
        if target_rate >= config_range.min_sample_rate()
            && target_rate <= config_range.max_sample_rate()
        {
            let buffer_size = match config_range.buffer_size() {
                SupportedBufferSize::Range { min, max }
                    if config.buffer_size >= *min && config.buffer_size <= *max =>
                {
                    BufferSize::Fixed(config.buffer_size)
                }
                _ => BufferSize::Default,
            };
            let mut stream_config: StreamConfig =
                config_range.with_sample_rate(target_rate).into();
            stream_config.buffer_size = buffer_size;
            return Ok(stream_config);
        }
    }

    let default_config = device
        .default_output_config()
        .map_err(|e| SynthError::Device(e.to_string()))?;
    if default_config.sample_format() != SampleFormat::F32 {
        return Err(SynthError::Device(format!(
            "no f32 output format (device default is {})",
            default_config.sample_format()
        )));
    }
    log::warn!(
        "Could not find a {} Hz config, using default ({} Hz)",
        config.sample_rate,
        default_config.sample_rate()
    );
    Ok(default_config.into())
}

/// Information about an audio output device.
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    /// Device name.
    pub name: String,
    /// Maximum number of output channels.
    pub max_channels: u16,
    /// Whether this is the default device.
    pub is_default: bool,
}

/// List available audio output devices.
pub fn list_audio_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let mut devices = Vec::new();

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let max_channels = device
                    .supported_output_configs()
                    .ok()
                    .and_then(|configs| configs.map(|c| c.channels()).max())
                    .unwrap_or(2);

                devices.push(AudioDeviceInfo {
                    is_default: name == default_name,
                    name,
                    max_channels,
                });
            }
        }
    }

    devices
}

/// Get the default audio device name.
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device().and_then(|d| d.name().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = Settings::default();
        let config = AudioOutputConfig::from(&settings);
        assert_eq!(config.device_name, "");
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.buffer_size, 512);

        let settings = Settings {
            audio_device: "MOTU M4".to_string(),
            audio_sample_rate: 44100,
            ..Settings::default()
        };
        let config = AudioOutputConfig::from(&settings);
        assert_eq!(config.device_name, "MOTU M4");
        assert_eq!(config.sample_rate, 44100);
    }
}
