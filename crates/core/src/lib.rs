pub use config::{Allowed, ConfigError, ConfigManager, SettingInfo};
pub use error::{EngineError, EngineResult};
pub use game::harmony::{HarmonyChord, HarmonyLevel, HarmonyRound, SelectionOutcome};
pub use game::score_keeper::ScoreKeeper;
pub use game::session::{GameSession, SessionSummary};
pub use messages::{EngineCommand, EngineEvent, Settings, VoiceKey};
// Async module system exports
pub use modules::{
    AsyncModule, ModuleEvent, ModuleId, ModuleManager, ModuleMessage, RhythmModule,
};
pub use rhythm::clock::{BeatCallback, BeatClock, ClockState, Tick};
pub use rhythm::library::{Difficulty, PatternLibrary, PatternPreset};
pub use rhythm::matcher::{BeatGrid, MatchVerdict, RhythmMatcher, TapEvent, ToleranceWindow};
pub use rhythm::pattern::{BeatPattern, BeatStrength, TimeSignature, MAX_BPM, MIN_BPM};
pub use tone::tone_table::{
    chord_frequencies, frequency_of, intervals_of, note_for_key, ChordQuality, Note, NoteName,
};
pub use tone::waveform::Waveform;

mod config;
pub mod error;
pub mod game;
pub mod messages;
pub mod modules;
pub mod rhythm;
pub mod tone;
