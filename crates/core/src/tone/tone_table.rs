//! Note and chord lookup tables.
//!
//! Frequencies are equal-tempered around A4 = 440 Hz and cover the single
//! octave the piano exposes (C4 through B4).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Reference pitch for the equal-tempered table.
pub const A4_FREQUENCY: f64 = 440.0;

/// The twelve chromatic note names, in ascending order from C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoteName {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl NoteName {
    pub const ALL: [NoteName; 12] = [
        Self::C,
        Self::CSharp,
        Self::D,
        Self::DSharp,
        Self::E,
        Self::F,
        Self::FSharp,
        Self::G,
        Self::GSharp,
        Self::A,
        Self::ASharp,
        Self::B,
    ];

    /// Semitones above C.
    pub fn semitone(&self) -> i32 {
        *self as i32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::C => "C",
            Self::CSharp => "C#",
            Self::D => "D",
            Self::DSharp => "D#",
            Self::E => "E",
            Self::F => "F",
            Self::FSharp => "F#",
            Self::G => "G",
            Self::GSharp => "G#",
            Self::A => "A",
            Self::ASharp => "A#",
            Self::B => "B",
        }
    }

    /// Black keys are the sharps.
    pub fn is_black(&self) -> bool {
        matches!(
            self,
            Self::CSharp | Self::DSharp | Self::FSharp | Self::GSharp | Self::ASharp
        )
    }

    /// Equal-tempered frequency of this note in octave 4.
    pub fn frequency(&self) -> f64 {
        A4_FREQUENCY * 2f64.powf((self.semitone() - Self::A.semitone()) as f64 / 12.0)
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|note| note.as_str() == s)
            .ok_or_else(|| EngineError::UnknownNote(s.to_string()))
    }
}

/// A note with its resolved frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Note {
    pub name: NoteName,
    pub frequency: f64,
}

impl Note {
    pub fn new(name: NoteName) -> Self {
        Self {
            name,
            frequency: name.frequency(),
        }
    }

    /// All twelve notes of the piano octave.
    pub fn all() -> impl Iterator<Item = Note> {
        NoteName::ALL.into_iter().map(Note::new)
    }
}

/// Look up the frequency of a note by name.
pub fn frequency_of(note: &str) -> Result<f64, EngineError> {
    note.parse::<NoteName>().map(|name| name.frequency())
}

/// Chord quality recognised by [`intervals_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordQuality {
    MajorSeventh,
    DominantSeventh,
    Diminished,
    Augmented,
    Minor,
    Major,
}

impl ChordQuality {
    /// Classify a chord symbol by substring, first match wins.
    ///
    /// The order is `maj7`, `7`, `dim`, `aug`, `m`, then major. A compound
    /// symbol like `"Am7"` therefore reads as a dominant seventh, not a minor
    /// seventh: the `7` test runs before the `m` test.
    pub fn classify(symbol: &str) -> Self {
        if symbol.contains("maj7") {
            Self::MajorSeventh
        } else if symbol.contains('7') {
            Self::DominantSeventh
        } else if symbol.contains("dim") {
            Self::Diminished
        } else if symbol.contains("aug") {
            Self::Augmented
        } else if symbol.contains('m') {
            Self::Minor
        } else {
            Self::Major
        }
    }

    /// Semitone offsets from the root. Always starts with 0 and stays below 12.
    pub fn intervals(&self) -> &'static [i32] {
        match self {
            Self::MajorSeventh => &[0, 4, 7, 11],
            Self::DominantSeventh => &[0, 4, 7, 10],
            Self::Diminished => &[0, 3, 6],
            Self::Augmented => &[0, 4, 8],
            Self::Minor => &[0, 3, 7],
            Self::Major => &[0, 4, 7],
        }
    }
}

/// Semitone intervals for a chord symbol.
pub fn intervals_of(symbol: &str) -> Vec<i32> {
    ChordQuality::classify(symbol).intervals().to_vec()
}

/// Frequencies of every chord tone built on `root`.
pub fn chord_frequencies(symbol: &str, root: &str) -> Result<Vec<f64>, EngineError> {
    let base = frequency_of(root)?;
    Ok(intervals_of(symbol)
        .into_iter()
        .map(|interval| base * 2f64.powf(interval as f64 / 12.0))
        .collect())
}

/// Computer keyboard layout of the virtual piano.
///
/// The home row plays the white keys, the row above plays the black keys.
pub fn note_for_key(key: char) -> Option<NoteName> {
    let note = match key.to_ascii_lowercase() {
        'a' => NoteName::C,
        'w' => NoteName::CSharp,
        's' => NoteName::D,
        'e' => NoteName::DSharp,
        'd' => NoteName::E,
        'f' => NoteName::F,
        't' => NoteName::FSharp,
        'g' => NoteName::G,
        'y' => NoteName::GSharp,
        'h' => NoteName::A,
        'u' => NoteName::ASharp,
        'j' => NoteName::B,
        _ => return None,
    };
    Some(note)
}
