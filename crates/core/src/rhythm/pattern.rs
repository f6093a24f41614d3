use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Slowest tempo the engine accepts.
pub const MIN_BPM: f64 = 40.0;
/// Fastest tempo the engine accepts.
pub const MAX_BPM: f64 = 200.0;

/// Accent of one position in a rhythmic pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeatStrength {
    Strong,
    Weak,
}

impl BeatStrength {
    /// Decode the `1`/`0` notation used by the pattern tables.
    pub fn from_flag(flag: u8) -> Self {
        if flag == 1 {
            Self::Strong
        } else {
            Self::Weak
        }
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, Self::Strong)
    }
}

/// Time signature as written, e.g. `6/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub const COMMON: [&'static str; 5] = ["4/4", "3/4", "2/4", "6/8", "12/8"];

    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidTimeSignature(s.to_string());
        let (num, den) = s.split_once('/').ok_or_else(invalid)?;
        let numerator: u8 = num.trim().parse().map_err(|_| invalid())?;
        let denominator: u8 = den.trim().parse().map_err(|_| invalid())?;
        if numerator == 0 || denominator == 0 {
            return Err(invalid());
        }
        Ok(Self::new(numerator, denominator))
    }
}

/// Tempo plus the accent cycle the clock walks through.
///
/// `beats` cycles on its own length; `time_signature_numerator` only drives
/// the "beat in measure" display. The two may disagree (a 6-step pattern in
/// 4/4 is accepted).
///
/// Fields are private so every pattern, deserialized ones included, has gone
/// through [`BeatPattern::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PatternFields", into = "PatternFields")]
pub struct BeatPattern {
    time_signature_numerator: u8,
    bpm: f64,
    beats: Vec<BeatStrength>,
}

/// Wire form of [`BeatPattern`].
#[derive(Serialize, Deserialize)]
struct PatternFields {
    time_signature_numerator: u8,
    bpm: f64,
    beats: Vec<BeatStrength>,
}

impl TryFrom<PatternFields> for BeatPattern {
    type Error = EngineError;

    fn try_from(fields: PatternFields) -> Result<Self, Self::Error> {
        Self::new(fields.bpm, fields.time_signature_numerator, fields.beats)
    }
}

impl From<BeatPattern> for PatternFields {
    fn from(pattern: BeatPattern) -> Self {
        Self {
            time_signature_numerator: pattern.time_signature_numerator,
            bpm: pattern.bpm,
            beats: pattern.beats,
        }
    }
}

impl BeatPattern {
    /// Validate and build a pattern.
    ///
    /// Empty patterns and non-positive tempos are rejected. Tempos outside
    /// 40-200 BPM are clamped into range.
    pub fn new(
        bpm: f64,
        time_signature_numerator: u8,
        beats: Vec<BeatStrength>,
    ) -> Result<Self, EngineError> {
        if beats.is_empty() {
            return Err(EngineError::InvalidPattern(
                "pattern has no beats".to_string(),
            ));
        }
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(EngineError::InvalidPattern(format!(
                "bpm must be positive, got {}",
                bpm
            )));
        }
        if time_signature_numerator == 0 {
            return Err(EngineError::InvalidPattern(
                "time signature numerator must be at least 1".to_string(),
            ));
        }

        let clamped = bpm.clamp(MIN_BPM, MAX_BPM);
        if clamped != bpm {
            log::warn!(
                "BPM {} outside {}-{}, clamped to {}",
                bpm,
                MIN_BPM,
                MAX_BPM,
                clamped
            );
        }

        Ok(Self {
            time_signature_numerator,
            bpm: clamped,
            beats,
        })
    }

    /// Plain metronome pattern: a strong downbeat followed by weak beats.
    pub fn metronome(bpm: f64, signature: TimeSignature) -> Result<Self, EngineError> {
        let beats = (0..signature.numerator.max(1))
            .map(|i| {
                if i == 0 {
                    BeatStrength::Strong
                } else {
                    BeatStrength::Weak
                }
            })
            .collect();
        Self::new(bpm, signature.numerator, beats)
    }

    /// Build from the `1`/`0` flag notation.
    pub fn from_flags(bpm: f64, numerator: u8, flags: &[u8]) -> Result<Self, EngineError> {
        Self::new(
            bpm,
            numerator,
            flags.iter().copied().map(BeatStrength::from_flag).collect(),
        )
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time_signature_numerator(&self) -> u8 {
        self.time_signature_numerator
    }

    pub fn beats(&self) -> &[BeatStrength] {
        &self.beats
    }

    /// Seconds between two beats.
    pub fn interval_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Strength of the `index`-th beat, cycling through the pattern.
    pub fn strength_at(&self, index: usize) -> BeatStrength {
        self.beats[index % self.beats.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_pattern() {
        let result = BeatPattern::new(120.0, 4, vec![]);
        assert!(matches!(result, Err(EngineError::InvalidPattern(_))));
    }

    #[test]
    fn test_rejects_non_positive_bpm() {
        for bpm in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            let result = BeatPattern::new(bpm, 4, vec![BeatStrength::Strong]);
            assert!(
                matches!(result, Err(EngineError::InvalidPattern(_))),
                "bpm {} should be rejected",
                bpm
            );
        }
    }

    #[test]
    fn test_clamps_bpm_into_range() {
        let slow = BeatPattern::new(10.0, 4, vec![BeatStrength::Strong]).unwrap();
        assert_eq!(slow.bpm(), MIN_BPM);

        let fast = BeatPattern::new(300.0, 4, vec![BeatStrength::Strong]).unwrap();
        assert_eq!(fast.bpm(), MAX_BPM);
    }

    #[test]
    fn test_strength_cycles() {
        let pattern = BeatPattern::from_flags(120.0, 4, &[1, 0, 0]).unwrap();
        assert_eq!(pattern.strength_at(0), BeatStrength::Strong);
        assert_eq!(pattern.strength_at(2), BeatStrength::Weak);
        assert_eq!(pattern.strength_at(3), BeatStrength::Strong);
        assert_eq!(pattern.strength_at(301), BeatStrength::Weak);
    }

    #[test]
    fn test_numerator_may_differ_from_pattern_length() {
        let pattern = BeatPattern::from_flags(100.0, 4, &[1, 0, 0, 1, 0, 0]).unwrap();
        assert_eq!(pattern.time_signature_numerator(), 4);
        assert_eq!(pattern.beats().len(), 6);
    }

    #[test]
    fn test_metronome_pattern() {
        let pattern = BeatPattern::metronome(120.0, "3/4".parse().unwrap()).unwrap();
        assert_eq!(
            pattern.beats(),
            [BeatStrength::Strong, BeatStrength::Weak, BeatStrength::Weak]
        );
        assert!((pattern.interval_seconds() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_deserialize_validates() {
        let empty = r#"{"time_signature_numerator":4,"bpm":120.0,"beats":[]}"#;
        let err = serde_json::from_str::<BeatPattern>(empty).unwrap_err();
        assert!(err.to_string().contains("pattern has no beats"), "{}", err);

        let no_measure = r#"{"time_signature_numerator":0,"bpm":120.0,"beats":["Strong"]}"#;
        assert!(serde_json::from_str::<BeatPattern>(no_measure).is_err());

        let fast = r#"{"time_signature_numerator":3,"bpm":500.0,"beats":["Strong","Weak"]}"#;
        let pattern: BeatPattern = serde_json::from_str(fast).unwrap();
        assert_eq!(pattern.bpm(), MAX_BPM);
        assert_eq!(pattern.time_signature_numerator(), 3);
    }

    #[test]
    fn test_serializes_like_a_plain_struct() {
        let pattern = BeatPattern::from_flags(90.0, 2, &[1, 0]).unwrap();
        let json = serde_json::to_value(&pattern).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "time_signature_numerator": 2,
                "bpm": 90.0,
                "beats": ["Strong", "Weak"],
            })
        );
        let back: BeatPattern = serde_json::from_value(json).unwrap();
        assert_eq!(back, pattern);
    }

    #[test]
    fn test_time_signature_parsing() {
        for sig in TimeSignature::COMMON {
            let parsed: TimeSignature = sig.parse().unwrap();
            assert_eq!(parsed.to_string(), sig);
        }
        assert!("4".parse::<TimeSignature>().is_err());
        assert!("0/4".parse::<TimeSignature>().is_err());
        assert!("x/4".parse::<TimeSignature>().is_err());
    }
}
