pub mod tone_table;
pub mod waveform;
