//! Cadence audio
//!
//! Sound output and engine wiring for the Cadence practice tools.
//!
//! # Features
//!
//! - Oscillator voices with attack/decay envelopes and exponential release
//! - At most one live voice per key, stopped in the order requested
//! - Output on a cpal stream owned by its own thread
//! - Silent fallback when no audio device can be opened
//! - `Engine` handle that runs the rhythm and synth modules

pub mod audio_output;
pub mod engine;
pub mod error;
pub mod synth_module;
pub mod voice;
pub mod voice_engine;

// Re-export main types
pub use audio_output::{default_device_name, list_audio_devices, AudioDeviceInfo, AudioOutputConfig};
pub use engine::Engine;
pub use error::SynthError;
pub use synth_module::SynthModule;
pub use voice::{click_frequency, Envelope, Release, Voice, VoiceParams};
pub use voice_engine::{VoiceBank, VoiceEngine, VoiceEvent};
