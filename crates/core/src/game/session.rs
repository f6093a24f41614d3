use serde::{Deserialize, Serialize};

use crate::rhythm::matcher::{MatchVerdict, TapEvent};

/// Running state of one rhythm round.
///
/// Taps and verdicts grow together: every recorded tap has exactly one
/// verdict at the same position.
#[derive(Debug, Clone, Default)]
pub struct GameSession {
    pub score: i64,
    pub streak: u32,
    pub mistakes: u32,
    pub taps: Vec<TapEvent>,
    pub verdicts: Vec<MatchVerdict>,
    pub best_streak: u32,
    finalized: Option<SessionSummary>,
}

impl GameSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.finalized.as_ref()
    }

    pub fn matched_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.matched).count()
    }

    /// Percentage of taps that matched, 0 when nothing was tapped.
    pub fn accuracy(&self) -> f64 {
        if self.taps.is_empty() {
            return 0.0;
        }
        self.matched_count() as f64 / self.taps.len() as f64 * 100.0
    }

    pub(crate) fn freeze(&mut self) -> SessionSummary {
        if let Some(summary) = &self.finalized {
            return summary.clone();
        }
        let summary = SessionSummary {
            score: self.score,
            accuracy: self.accuracy(),
            mistakes: self.mistakes,
            taps: self.taps.len(),
            best_streak: self.best_streak,
        };
        self.finalized = Some(summary.clone());
        summary
    }
}

/// Frozen result of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub score: i64,
    pub accuracy: f64,
    pub mistakes: u32,
    pub taps: usize,
    pub best_streak: u32,
}
