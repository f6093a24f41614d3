//! A single oscillator voice with its amplitude envelope.
//!
//! Envelopes are evaluated in samples so rendering is deterministic for a
//! given sample rate, whether it runs in the audio callback or offline.

use std::time::{Duration, Instant};

use cadence_core::{BeatStrength, VoiceKey, Waveform};

/// Gain the exponential ramps stop at. An exponential curve never reaches 0.
pub const ENVELOPE_FLOOR: f32 = 0.01;

/// Default peak gain of a voice.
pub const DEFAULT_AMPLITUDE: f32 = 0.3;

/// Default linear attack time.
pub const DEFAULT_ATTACK: Duration = Duration::from_millis(10);

/// Click frequencies of the metronome.
pub const STRONG_CLICK_HZ: f64 = 1000.0;
pub const WEAK_CLICK_HZ: f64 = 800.0;

/// Exponential fall from the peak to a floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decay {
    pub floor: f32,
    pub duration: Duration,
}

/// Linear attack to `peak`, then either hold or decay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: Duration,
    pub peak: f32,
    pub decay: Option<Decay>,
}

impl Envelope {
    /// Gain `seconds` after the voice started.
    pub fn level_at(&self, seconds: f64) -> f32 {
        let attack = self.attack.as_secs_f64();
        if seconds < attack {
            return self.peak * (seconds / attack) as f32;
        }

        match self.decay {
            None => self.peak,
            Some(decay) => {
                let elapsed = seconds - attack;
                let duration = decay.duration.as_secs_f64();
                if elapsed >= duration || self.peak <= decay.floor {
                    decay.floor.min(self.peak)
                } else {
                    exponential(self.peak, decay.floor, elapsed / duration)
                }
            }
        }
    }
}

/// What happens when a voice is stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Release {
    /// Cut off at once.
    Immediate,
    /// Fade from the current gain down to `floor`, then cut off.
    Exponential { floor: f32, duration: Duration },
}

/// Everything needed to start a voice apart from its key and pitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    pub waveform: Waveform,
    pub envelope: Envelope,
    pub release: Release,
    pub auto_stop_after: Option<Duration>,
}

impl VoiceParams {
    /// Metronome click: short attack, decays to the floor by 100ms, then stops.
    pub fn click() -> Self {
        Self {
            waveform: Waveform::Sine,
            envelope: Envelope {
                attack: DEFAULT_ATTACK,
                peak: DEFAULT_AMPLITUDE,
                decay: Some(Decay {
                    floor: ENVELOPE_FLOOR,
                    duration: Duration::from_millis(90),
                }),
            },
            release: Release::Exponential {
                floor: ENVELOPE_FLOOR,
                duration: Duration::from_millis(100),
            },
            auto_stop_after: Some(Duration::from_millis(100)),
        }
    }

    /// Piano key: sounds until stopped, stops without a tail.
    pub fn sustained() -> Self {
        Self {
            waveform: Waveform::Sine,
            envelope: Envelope {
                attack: DEFAULT_ATTACK,
                peak: DEFAULT_AMPLITUDE,
                decay: None,
            },
            release: Release::Immediate,
            auto_stop_after: None,
        }
    }

    /// Chord tone: starts at full gain and rings out over a second.
    pub fn chord_tone() -> Self {
        Self {
            waveform: Waveform::Sine,
            envelope: Envelope {
                attack: Duration::ZERO,
                peak: DEFAULT_AMPLITUDE,
                decay: Some(Decay {
                    floor: ENVELOPE_FLOOR,
                    duration: Duration::from_secs(1),
                }),
            },
            release: Release::Immediate,
            auto_stop_after: Some(Duration::from_secs(1)),
        }
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.envelope.peak = amplitude.clamp(0.0, 1.0);
        self
    }
}

pub fn click_frequency(strength: BeatStrength) -> f64 {
    match strength {
        BeatStrength::Strong => STRONG_CLICK_HZ,
        BeatStrength::Weak => WEAK_CLICK_HZ,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Releasing {
    from: f32,
    floor: f32,
    samples: u64,
    length: u64,
}

/// One sounding tone.
///
/// Wall-clock bookkeeping (`started_at`, `auto_stop_at`) is read by the
/// control side to schedule auto-stops. The audio callback only advances the
/// sample counters.
#[derive(Debug, Clone)]
pub struct Voice {
    key: VoiceKey,
    frequency: f64,
    params: VoiceParams,
    started_at: Instant,
    auto_stop_at: Option<Instant>,
    phase: f64,
    elapsed: u64,
    releasing: Option<Releasing>,
}

impl Voice {
    pub fn new(key: VoiceKey, frequency: f64, params: VoiceParams, started_at: Instant) -> Self {
        let auto_stop_at = params.auto_stop_after.map(|after| started_at + after);
        Self {
            key,
            frequency,
            params,
            started_at,
            auto_stop_at,
            phase: 0.0,
            elapsed: 0,
            releasing: None,
        }
    }

    pub fn key(&self) -> &VoiceKey {
        &self.key
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn params(&self) -> &VoiceParams {
        &self.params
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// When the voice stops on its own, if it does.
    pub fn auto_stop_at(&self) -> Option<Instant> {
        self.auto_stop_at
    }

    /// The auto-stop is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.auto_stop_at.is_some_and(|at| at <= now)
    }

    pub fn is_releasing(&self) -> bool {
        self.releasing.is_some()
    }

    /// Current gain at `sample_rate`.
    pub fn level(&self, sample_rate: u32) -> f32 {
        match self.releasing {
            Some(release) => {
                let progress = release.samples as f64 / release.length.max(1) as f64;
                exponential(release.from, release.floor, progress.min(1.0))
            }
            None => self
                .params
                .envelope
                .level_at(self.elapsed as f64 / sample_rate as f64),
        }
    }

    /// Switch to the release stage.
    ///
    /// Returns `false` when nothing is left to play and the voice can be
    /// dropped right away.
    pub fn begin_release(&mut self, sample_rate: u32) -> bool {
        if self.releasing.is_some() {
            return !self.is_finished();
        }
        match self.params.release {
            Release::Immediate => false,
            Release::Exponential { floor, duration } => {
                let from = self.level(sample_rate);
                if from <= floor {
                    return false;
                }
                self.releasing = Some(Releasing {
                    from,
                    floor,
                    samples: 0,
                    length: (duration.as_secs_f64() * sample_rate as f64).round() as u64,
                });
                true
            }
        }
    }

    /// A released voice whose tail has fully faded.
    pub fn is_finished(&self) -> bool {
        self.releasing
            .map(|release| release.samples >= release.length)
            .unwrap_or(false)
    }

    /// Next mono sample, advancing the oscillator and envelope.
    pub fn next_sample(&mut self, sample_rate: u32) -> f32 {
        if self.is_finished() {
            return 0.0;
        }
        let gain = self.level(sample_rate);
        let sample = self.params.waveform.sample(self.phase) as f32 * gain;

        self.phase = (self.phase + self.frequency / sample_rate as f64).fract();
        self.elapsed += 1;
        if let Some(release) = self.releasing.as_mut() {
            release.samples += 1;
        }
        sample
    }
}

/// Exponential interpolation from `from` to `to` at `progress` in 0..=1.
fn exponential(from: f32, to: f32, progress: f64) -> f32 {
    if from <= 0.0 || to <= 0.0 {
        return from + (to - from) * progress as f32;
    }
    (from as f64 * (to as f64 / from as f64).powf(progress)) as f32
}
