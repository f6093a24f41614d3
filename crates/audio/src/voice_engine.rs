//! Owner of every sounding voice.
//!
//! The control side (`VoiceEngine`) and the audio callback share one
//! [`VoiceBank`] behind a mutex. All starts and stops go through the engine,
//! which is owned by a single task, so they apply in the order they were
//! issued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use cadence_core::VoiceKey;
use parking_lot::Mutex;

use crate::audio_output::{AudioOutput, AudioOutputConfig};
use crate::voice::{Voice, VoiceParams};

/// Master volume the metronome starts with.
pub const DEFAULT_VOLUME: f32 = 0.7;

/// Start/stop notifications, drained with [`VoiceEngine::take_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Started(VoiceKey),
    Stopped(VoiceKey),
}

/// Voices shared with the audio callback.
pub struct VoiceBank {
    voices: HashMap<VoiceKey, Voice>,
    /// Stopped voices still fading out.
    tails: Vec<Voice>,
    volume: f32,
    sample_rate: u32,
}

impl VoiceBank {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            voices: HashMap::new(),
            tails: Vec::new(),
            volume: DEFAULT_VOLUME,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    /// Mix every voice into an interleaved buffer, overwriting it.
    pub fn render(&mut self, data: &mut [f32], channels: usize) {
        data.fill(0.0);
        let channels = channels.max(1);
        let sample_rate = self.sample_rate;

        for frame in data.chunks_mut(channels) {
            let mut mix = 0.0;
            for voice in self.voices.values_mut() {
                mix += voice.next_sample(sample_rate);
            }
            for tail in self.tails.iter_mut() {
                mix += tail.next_sample(sample_rate);
            }
            let sample = (mix * self.volume).clamp(-1.0, 1.0);
            frame.fill(sample);
        }

        self.tails.retain(|tail| !tail.is_finished());
    }
}

enum Output {
    /// No device; the owner renders on its own (tests, offline bounce).
    Detached,
    Device(AudioOutput),
    /// Device failed to open. Every start is dropped.
    Unavailable(String),
}

pub struct VoiceEngine {
    bank: Arc<Mutex<VoiceBank>>,
    events: Vec<VoiceEvent>,
    output: Output,
}

impl VoiceEngine {
    fn with_output(bank: Arc<Mutex<VoiceBank>>, output: Output) -> Self {
        Self {
            bank,
            events: Vec::new(),
            output,
        }
    }

    /// Engine without an audio device.
    pub fn detached(sample_rate: u32) -> Self {
        let bank = Arc::new(Mutex::new(VoiceBank::new(sample_rate)));
        Self::with_output(bank, Output::Detached)
    }

    /// Engine whose device could not be opened. Every start is dropped.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let sample_rate = AudioOutputConfig::default().sample_rate;
        let bank = Arc::new(Mutex::new(VoiceBank::new(sample_rate)));
        Self::with_output(bank, Output::Unavailable(reason.into()))
    }

    /// Open the output device.
    ///
    /// Failure is not fatal: the engine comes up silent and reports the
    /// reason through [`VoiceEngine::unavailable_reason`].
    pub fn open(config: &AudioOutputConfig) -> Self {
        let bank = Arc::new(Mutex::new(VoiceBank::new(config.sample_rate)));
        let output = match AudioOutput::start(config, Arc::clone(&bank)) {
            Ok(output) => Output::Device(output),
            Err(e) => {
                log::error!("Audio output unavailable, continuing silently: {}", e);
                Output::Unavailable(e.to_string())
            }
        };

        Self::with_output(bank, output)
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.output {
            Output::Unavailable(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn has_device(&self) -> bool {
        matches!(self.output, Output::Device(_))
    }

    pub fn sample_rate(&self) -> u32 {
        self.bank.lock().sample_rate()
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.bank.lock().volume = volume;
        log::debug!("Master volume set to {:.2}", volume);
    }

    pub fn volume(&self) -> f32 {
        self.bank.lock().volume
    }

    /// Start a voice for `key`, replacing any voice already live for it.
    pub fn start(&mut self, key: VoiceKey, frequency: f64, params: VoiceParams, now: Instant) {
        if let Output::Unavailable(_) = self.output {
            log::debug!("No audio output, dropping {}", key);
            return;
        }
        if self.is_sounding(&key) {
            self.stop(&key);
        }

        self.bank
            .lock()
            .voices
            .insert(key.clone(), Voice::new(key.clone(), frequency, params, now));

        log::debug!("Voice {} started at {:.2} Hz", key, frequency);
        self.events.push(VoiceEvent::Started(key));
    }

    /// Stop the voice for `key`. Unknown keys are ignored.
    pub fn stop(&mut self, key: &VoiceKey) {
        let mut bank = self.bank.lock();
        let Some(mut voice) = bank.voices.remove(key) else {
            return;
        };
        let sample_rate = bank.sample_rate;
        if voice.begin_release(sample_rate) {
            bank.tails.push(voice);
        }
        drop(bank);

        log::debug!("Voice {} stopped", key);
        self.events.push(VoiceEvent::Stopped(key.clone()));
    }

    /// Stop every voice and drop every fading tail.
    pub fn stop_all(&mut self) {
        let stopped: Vec<VoiceKey> = {
            let mut bank = self.bank.lock();
            bank.tails.clear();
            bank.voices.drain().map(|(key, _)| key).collect()
        };

        if !stopped.is_empty() {
            log::debug!("Stopped {} voices", stopped.len());
        }
        self.events
            .extend(stopped.into_iter().map(VoiceEvent::Stopped));
    }

    /// Run the auto-stops that are due at `now`. Returns how many fired.
    pub fn reap_expired(&mut self, now: Instant) -> usize {
        let due: Vec<VoiceKey> = self
            .bank
            .lock()
            .voices
            .values()
            .filter(|voice| voice.is_due(now))
            .map(|voice| voice.key().clone())
            .collect();

        for key in &due {
            self.stop(key);
        }
        due.len()
    }

    /// Earliest pending auto-stop.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.bank
            .lock()
            .voices
            .values()
            .filter_map(Voice::auto_stop_at)
            .min()
    }

    /// Render into an interleaved buffer. Only meaningful when detached,
    /// otherwise the device callback is consuming the same voices.
    pub fn render(&self, data: &mut [f32], channels: usize) {
        self.bank.lock().render(data, channels);
    }

    pub fn take_events(&mut self) -> Vec<VoiceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_sounding(&self, key: &VoiceKey) -> bool {
        self.bank.lock().voices.contains_key(key)
    }

    /// Keys of the live voices, in no particular order.
    pub fn sounding(&self) -> Vec<VoiceKey> {
        self.bank.lock().voices.keys().cloned().collect()
    }

    pub fn live_count(&self) -> usize {
        self.bank.lock().voices.len()
    }

    pub fn tail_count(&self) -> usize {
        self.bank.lock().tails.len()
    }
}

impl Drop for VoiceEngine {
    fn drop(&mut self) {
        if let Output::Device(output) = &mut self.output {
            output.stop();
        }
    }
}
