use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::rhythm::matcher::{MatchVerdict, ToleranceWindow};
use crate::rhythm::pattern::{BeatStrength, TimeSignature};
use crate::tone::tone_table::NoteName;

/// Identity of a sounding voice. At most one voice per key is live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoiceKey {
    /// A piano key.
    Note(NoteName),
    /// The metronome click.
    Click,
    /// The n-th tone of the current chord.
    ChordTone(usize),
}

impl fmt::Display for VoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceKey::Note(name) => write!(f, "{}", name),
            VoiceKey::Click => write!(f, "click"),
            VoiceKey::ChordTone(index) => write!(f, "chord:{}", index),
        }
    }
}

/// Commands sent from the front end to the engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    // Rhythm
    ConfigurePattern {
        bpm: f64,
        numerator: u8,
        beats: Vec<BeatStrength>,
    },
    StartClock,
    StopClock,
    SetClickEnabled {
        enabled: bool,
    },

    // Synth
    PlayNote {
        note: String,
    },
    StopNote {
        note: String,
    },
    PlayChord {
        symbol: String,
        root: String,
    },
    SetVolume {
        volume: f32,
    },
    StopAll,

    // Rhythm game
    StartRound {
        time_limit: Option<Duration>,
    },
    RegisterTap {
        at: Instant,
    },
    FinishRound,

    Shutdown,
}

/// Settings configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    // Audio settings
    pub audio_device: String,
    pub audio_buffer_size: u32,
    pub audio_sample_rate: u32,
    pub master_volume: f32,

    // Metronome settings
    pub default_bpm: f64,
    pub default_time_signature: String,
    pub click_enabled: bool,

    // Game settings
    pub tolerance_fraction: f64,
    pub round_length_secs: u32,
    pub harmony_time_limit_secs: u32,
}

impl Settings {
    /// Parsed default time signature, 4/4 if the stored string is invalid.
    pub fn time_signature(&self) -> TimeSignature {
        self.default_time_signature.parse().unwrap_or_default()
    }

    pub fn tolerance(&self) -> ToleranceWindow {
        ToleranceWindow::Fraction(self.tolerance_fraction)
    }

    pub fn round_length(&self) -> Duration {
        Duration::from_secs(self.round_length_secs as u64)
    }

    pub fn harmony_time_limit(&self) -> Duration {
        Duration::from_secs(self.harmony_time_limit_secs as u64)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Audio defaults
            audio_device: "Default".to_string(),
            audio_buffer_size: 512,
            audio_sample_rate: 48000,
            master_volume: 0.7,

            // Metronome defaults
            default_bpm: 120.0,
            default_time_signature: "4/4".to_string(),
            click_enabled: true,

            // Game defaults
            tolerance_fraction: 0.25,
            round_length_secs: 30,
            harmony_time_limit_secs: 60,
        }
    }
}

/// Events sent from the engine to the front end
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    // Clock events
    ClockStarted {
        bpm: f64,
    },
    ClockStopped,
    Beat {
        index: usize,
        strength: BeatStrength,
        beat_in_measure: u8,
    },

    // Voice events
    VoiceStarted {
        key: VoiceKey,
    },
    VoiceStopped {
        key: VoiceKey,
    },

    // Game events
    RoundStarted {
        time_limit: Duration,
    },
    TapScored(MatchVerdict),
    SessionFinalized {
        score: i64,
        accuracy: f64,
        mistakes: u32,
    },

    // System events
    AudioUnavailable {
        reason: String,
    },
    Error {
        message: String,
    },
}
