//! Chord progression game: pick chords until the target progression is built.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::rhythm::library::Difficulty;

/// Time limit used when a level does not set its own.
pub const DEFAULT_LEVEL_TIME_LIMIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarmonyChord {
    /// Chord symbol, also accepted by the tone table (`"Dm"`, `"G7"`).
    pub name: String,
    pub roman_numeral: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonyLevel {
    pub id: usize,
    pub name: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub time_limit: Duration,
    pub chords: Vec<HarmonyChord>,
    pub target_progression: Vec<String>,
}

impl HarmonyLevel {
    pub fn chord(&self, name: &str) -> Option<&HarmonyChord> {
        self.chords.iter().find(|c| c.name == name)
    }

    /// The three built-in levels.
    pub fn builtin() -> Vec<HarmonyLevel> {
        fn chords(pairs: &[(&str, &str)]) -> Vec<HarmonyChord> {
            pairs
                .iter()
                .map(|(name, numeral)| HarmonyChord {
                    name: name.to_string(),
                    roman_numeral: numeral.to_string(),
                })
                .collect()
        }
        fn progression(numerals: &[&str]) -> Vec<String> {
            numerals.iter().map(|n| n.to_string()).collect()
        }

        vec![
            HarmonyLevel {
                id: 0,
                name: "Basic triads".to_string(),
                description: "The primary triads of C major".to_string(),
                difficulty: Difficulty::Easy,
                time_limit: DEFAULT_LEVEL_TIME_LIMIT,
                chords: chords(&[("C", "I"), ("F", "IV"), ("G", "V"), ("Am", "vi")]),
                target_progression: progression(&["I", "V", "vi", "IV"]),
            },
            HarmonyLevel {
                id: 1,
                name: "ii-V-I".to_string(),
                description: "The jazz cadence".to_string(),
                difficulty: Difficulty::Medium,
                time_limit: Duration::from_secs(45),
                chords: chords(&[("Dm", "ii"), ("G", "V"), ("C", "I"), ("G7", "V7")]),
                target_progression: progression(&["ii", "V7", "I"]),
            },
            HarmonyLevel {
                id: 2,
                name: "Seventh chords".to_string(),
                description: "A longer progression of seventh chords".to_string(),
                difficulty: Difficulty::Hard,
                time_limit: Duration::from_secs(30),
                chords: chords(&[
                    ("Cmaj7", "Imaj7"),
                    ("Am7", "vimi7"),
                    ("Dm7", "iimi7"),
                    ("G7", "V7"),
                    ("Fmaj7", "IVmaj7"),
                ]),
                target_progression: progression(&["Imaj7", "vimi7", "iimi7", "V7"]),
            },
        ]
    }
}

/// What a chord selection did to the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// Chord is not part of this level.
    Ignored,
    /// Progression is still a prefix of the target.
    Correct,
    /// Target reached; carries the points awarded.
    Completed { points: i64 },
    /// Progression diverged and was cleared.
    Incorrect,
}

pub struct HarmonyRound {
    level: HarmonyLevel,
    started_at: Instant,
    progression: Vec<String>,
    score: i64,
    streak: u32,
    mistakes: u32,
    completed: bool,
}

impl HarmonyRound {
    pub fn start(level: HarmonyLevel, now: Instant) -> Self {
        log::info!("Harmony level '{}' started", level.name);
        Self {
            level,
            started_at: now,
            progression: Vec::new(),
            score: 0,
            streak: 0,
            mistakes: 0,
            completed: false,
        }
    }

    pub fn level(&self) -> &HarmonyLevel {
        &self.level
    }

    pub fn progression(&self) -> &[String] {
        &self.progression
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn mistakes(&self) -> u32 {
        self.mistakes
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn seconds_left(&self, now: Instant) -> u64 {
        (self.started_at + self.level.time_limit)
            .saturating_duration_since(now)
            .as_secs()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.started_at + self.level.time_limit
    }

    pub fn select(&mut self, chord_name: &str, now: Instant) -> Result<SelectionOutcome, EngineError> {
        if self.completed || self.is_expired(now) {
            return Err(EngineError::SessionFinalized);
        }
        let Some(chord) = self.level.chord(chord_name) else {
            log::debug!("Chord {} is not part of this level", chord_name);
            return Ok(SelectionOutcome::Ignored);
        };

        self.progression.push(chord.roman_numeral.clone());
        let target = &self.level.target_progression;
        let on_track = self
            .progression
            .iter()
            .zip(target.iter())
            .all(|(picked, expected)| picked == expected)
            && self.progression.len() <= target.len();

        if !on_track {
            self.mistakes += 1;
            self.streak = 0;
            self.progression.clear();
            return Ok(SelectionOutcome::Incorrect);
        }

        if self.progression.len() == target.len() {
            let points = (self.seconds_left(now) as i64 * 10 + self.streak as i64 * 5).max(0);
            self.score += points;
            self.streak += 1;
            self.completed = true;
            log::info!("Harmony level '{}' completed for {} points", self.level.name, points);
            return Ok(SelectionOutcome::Completed { points });
        }

        self.streak += 1;
        Ok(SelectionOutcome::Correct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(id: usize) -> HarmonyLevel {
        HarmonyLevel::builtin().remove(id)
    }

    #[test]
    fn test_complete_progression_awards_points() {
        let start = Instant::now();
        let mut round = HarmonyRound::start(level(1), start);

        assert_eq!(round.select("Dm", start).unwrap(), SelectionOutcome::Correct);
        assert_eq!(round.select("G7", start).unwrap(), SelectionOutcome::Correct);
        // 40 s left, streak 2 before the final pick: 400 + 10
        let outcome = round.select("C", start + Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, SelectionOutcome::Completed { points: 410 });
        assert!(round.is_completed());
        assert_eq!(round.score(), 410);
        assert_eq!(round.streak(), 3);
    }

    #[test]
    fn test_wrong_chord_clears_progression() {
        let start = Instant::now();
        let mut round = HarmonyRound::start(level(0), start);

        round.select("C", start).unwrap();
        assert_eq!(round.select("F", start).unwrap(), SelectionOutcome::Incorrect);
        assert!(round.progression().is_empty());
        assert_eq!(round.mistakes(), 1);
        assert_eq!(round.streak(), 0);
    }

    #[test]
    fn test_unknown_chord_ignored() {
        let start = Instant::now();
        let mut round = HarmonyRound::start(level(0), start);
        assert_eq!(round.select("B7", start).unwrap(), SelectionOutcome::Ignored);
        assert!(round.progression().is_empty());
        assert_eq!(round.mistakes(), 0);
    }

    #[test]
    fn test_rejects_after_time_limit() {
        let start = Instant::now();
        let mut round = HarmonyRound::start(level(2), start);
        let result = round.select("Cmaj7", start + Duration::from_secs(30));
        assert_eq!(result, Err(EngineError::SessionFinalized));
    }

    #[test]
    fn test_level_chords_are_playable() {
        for level in HarmonyLevel::builtin() {
            for numeral in &level.target_progression {
                assert!(level.chords.iter().any(|c| &c.roman_numeral == numeral));
            }
            for chord in &level.chords {
                let root = chord.name.get(..1).unwrap();
                assert!(crate::tone::tone_table::chord_frequencies(&chord.name, root).is_ok());
            }
        }
    }
}
