//! Built-in practice patterns for the rhythm game.

use serde::{Deserialize, Serialize};

use super::pattern::{BeatPattern, TimeSignature};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// A named pattern with its presentation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternPreset {
    pub id: usize,
    pub name: String,
    /// `1` = strong, `0` = weak.
    pub flags: Vec<u8>,
    pub bpm: f64,
    pub time_signature: TimeSignature,
    pub difficulty: Difficulty,
    pub description: String,
}

impl PatternPreset {
    pub fn to_pattern(&self) -> Result<BeatPattern, EngineError> {
        BeatPattern::from_flags(self.bpm, self.time_signature.numerator, &self.flags)
    }
}

pub struct PatternLibrary {
    presets: Vec<PatternPreset>,
}

impl PatternLibrary {
    pub fn builtin() -> Self {
        let preset = |id: usize,
                      name: &str,
                      flags: &[u8],
                      bpm: f64,
                      signature: (u8, u8),
                      difficulty: Difficulty,
                      description: &str| PatternPreset {
            id,
            name: name.to_string(),
            flags: flags.to_vec(),
            bpm,
            time_signature: TimeSignature::new(signature.0, signature.1),
            difficulty,
            description: description.to_string(),
        };

        Self {
            presets: vec![
                preset(
                    0,
                    "Basic 4-beat",
                    &[1, 0, 1, 0],
                    120.0,
                    (4, 4),
                    Difficulty::Easy,
                    "Learn to tell strong beats from weak ones",
                ),
                preset(
                    1,
                    "Compound rhythm",
                    &[1, 0, 0, 1, 0, 0],
                    100.0,
                    (6, 8),
                    Difficulty::Medium,
                    "Practice the compound feel of 6/8",
                ),
                preset(
                    2,
                    "Syncopation",
                    &[1, 0, 0, 1, 0, 1, 0, 0],
                    90.0,
                    (4, 4),
                    Difficulty::Hard,
                    "Accents land where you do not expect them",
                ),
                preset(
                    3,
                    "Waltz",
                    &[1, 0, 0],
                    140.0,
                    (3, 4),
                    Difficulty::Easy,
                    "The basic three-beat waltz",
                ),
                preset(
                    4,
                    "Sixteenth notes",
                    &[1, 0, 0, 0, 1, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0],
                    80.0,
                    (4, 4),
                    Difficulty::Hard,
                    "A dense pattern built from sixteenth notes",
                ),
            ],
        }
    }

    pub fn get(&self, id: usize) -> Option<&PatternPreset> {
        self.presets.iter().find(|p| p.id == id)
    }

    pub fn presets(&self) -> &[PatternPreset] {
        &self.presets
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}
