//! Score, streak and mistake bookkeeping for a rhythm round.

use std::time::{Duration, Instant};

use super::session::{GameSession, SessionSummary};
use crate::error::EngineError;
use crate::rhythm::matcher::{MatchVerdict, RhythmMatcher, TapEvent};

/// Round length used by the rhythm game.
pub const DEFAULT_ROUND_LENGTH: Duration = Duration::from_secs(30);

/// Points for a hit before the streak bonus.
const BASE_POINTS: i64 = 10;
/// Extra points per beat of the current streak.
const STREAK_BONUS: i64 = 2;

pub struct ScoreKeeper {
    session: GameSession,
    ends_at: Option<Instant>,
}

impl ScoreKeeper {
    pub fn new() -> Self {
        Self {
            session: GameSession::new(),
            ends_at: None,
        }
    }

    /// Fresh session that expires `time_limit` after `now`.
    pub fn with_deadline(now: Instant, time_limit: Duration) -> Self {
        Self {
            session: GameSession::new(),
            ends_at: Some(now + time_limit),
        }
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn deadline(&self) -> Option<Instant> {
        if self.session.is_finalized() {
            None
        } else {
            self.ends_at
        }
    }

    /// Seconds left in the round, rounded down.
    pub fn seconds_left(&self, now: Instant) -> u64 {
        self.ends_at
            .map(|end| end.saturating_duration_since(now).as_secs())
            .unwrap_or(0)
    }

    /// Apply one verdict to the running totals.
    pub fn record(&mut self, verdict: &MatchVerdict) -> Result<(), EngineError> {
        if self.session.is_finalized() {
            return Err(EngineError::SessionFinalized);
        }

        let session = &mut self.session;
        if verdict.matched {
            session.score += BASE_POINTS + session.streak as i64 * STREAK_BONUS;
            session.streak += 1;
            session.best_streak = session.best_streak.max(session.streak);
        } else {
            session.mistakes += 1;
            session.streak = 0;
        }
        Ok(())
    }

    /// Classify a tap with `matcher` and score it.
    pub fn register_tap(
        &mut self,
        matcher: &RhythmMatcher,
        tap: TapEvent,
    ) -> Result<MatchVerdict, EngineError> {
        if self.session.is_finalized() {
            log::warn!("Tap ignored, session already finalized");
            return Err(EngineError::SessionFinalized);
        }
        let verdict = matcher.on_tap(&mut self.session, tap);
        self.record(&verdict)?;
        Ok(verdict)
    }

    /// Freeze the session and compute the summary. Calling it again returns
    /// the same summary.
    pub fn finalize(&mut self) -> SessionSummary {
        let first = !self.session.is_finalized();
        let summary = self.session.freeze();
        if first {
            log::info!(
                "Round finished: score {}, accuracy {:.1}%, {} mistakes",
                summary.score,
                summary.accuracy,
                summary.mistakes
            );
        }
        summary
    }

    /// Finalize if the round ran out of time at `now`.
    pub fn expire(&mut self, now: Instant) -> Option<SessionSummary> {
        match self.deadline() {
            Some(deadline) if deadline <= now => Some(self.finalize()),
            _ => None,
        }
    }
}

impl Default for ScoreKeeper {
    fn default() -> Self {
        Self::new()
    }
}
