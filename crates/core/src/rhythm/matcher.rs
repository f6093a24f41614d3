//! Tap alignment against the expected beat grid.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::pattern::{BeatPattern, BeatStrength};
use crate::game::session::GameSession;

/// Default tolerance: a quarter of the beat interval on either side.
pub const DEFAULT_TOLERANCE_FRACTION: f64 = 0.25;

/// A user tap as received from the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapEvent {
    pub received_at: Instant,
}

impl TapEvent {
    pub fn at(received_at: Instant) -> Self {
        Self { received_at }
    }
}

/// Outcome of one tap. Never changed after it is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchVerdict {
    pub tap_index: usize,
    pub expected: BeatStrength,
    pub matched: bool,
}

/// Expected beat times: beat `anchor_index` falls on `anchor`, the others
/// are whole intervals away from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatGrid {
    pub anchor: Instant,
    pub anchor_index: usize,
    pub interval: Duration,
}

impl BeatGrid {
    pub fn new(anchor: Instant, anchor_index: usize, interval: Duration) -> Self {
        Self {
            anchor,
            anchor_index,
            interval,
        }
    }

    /// Beat index closest to `at` and the absolute distance to it.
    ///
    /// Times before beat 0 snap to beat 0.
    pub fn nearest(&self, at: Instant) -> (usize, Duration) {
        let interval = self.interval.as_secs_f64();
        let offset = signed_seconds(at, self.anchor);
        let steps = (offset / interval).round() as i64;
        let index = (self.anchor_index as i64 + steps).max(0);

        let beat_offset = (index - self.anchor_index as i64) as f64 * interval;
        let distance = (offset - beat_offset).abs();
        (index as usize, Duration::from_secs_f64(distance))
    }
}

fn signed_seconds(at: Instant, origin: Instant) -> f64 {
    if at >= origin {
        (at - origin).as_secs_f64()
    } else {
        -(origin - at).as_secs_f64()
    }
}

/// How far from a beat a tap may land and still count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ToleranceWindow {
    /// Fraction of the beat interval, so faster tempos get tighter windows.
    Fraction(f64),
    Fixed(Duration),
}

impl ToleranceWindow {
    pub fn resolve(&self, interval: Duration) -> Duration {
        match self {
            Self::Fraction(fraction) => interval.mul_f64(fraction.clamp(0.0, 0.5)),
            Self::Fixed(window) => *window,
        }
    }
}

impl Default for ToleranceWindow {
    fn default() -> Self {
        Self::Fraction(DEFAULT_TOLERANCE_FRACTION)
    }
}

/// Classifies taps against a fixed pattern and grid.
#[derive(Debug, Clone)]
pub struct RhythmMatcher {
    pattern: BeatPattern,
    grid: BeatGrid,
    tolerance: ToleranceWindow,
    /// Strength every tap claims to hit.
    target: BeatStrength,
}

impl RhythmMatcher {
    pub fn new(pattern: BeatPattern, grid: BeatGrid) -> Self {
        Self {
            pattern,
            grid,
            tolerance: ToleranceWindow::default(),
            target: BeatStrength::Strong,
        }
    }

    pub fn with_tolerance(mut self, tolerance: ToleranceWindow) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_target(mut self, target: BeatStrength) -> Self {
        self.target = target;
        self
    }

    /// Re-anchor on a fresh grid after the clock changed tempo.
    pub fn set_grid(&mut self, grid: BeatGrid) {
        self.grid = grid;
    }

    pub fn pattern(&self) -> &BeatPattern {
        &self.pattern
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance.resolve(self.grid.interval)
    }

    /// Classify a tap without recording it.
    pub fn classify(&self, tap_index: usize, tap: TapEvent) -> MatchVerdict {
        let (beat_index, distance) = self.grid.nearest(tap.received_at);
        let expected = self.pattern.strength_at(beat_index);
        let matched = distance <= self.tolerance() && expected == self.target;

        MatchVerdict {
            tap_index,
            expected,
            matched,
        }
    }

    /// Record the tap in the session and append exactly one verdict.
    pub fn on_tap(&self, session: &mut GameSession, tap: TapEvent) -> MatchVerdict {
        let verdict = self.classify(session.taps.len(), tap);
        session.taps.push(tap);
        session.verdicts.push(verdict);
        log::debug!(
            "Tap {} against {:?} beat: {}",
            verdict.tap_index,
            verdict.expected,
            if verdict.matched { "hit" } else { "miss" }
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhythm::pattern::BeatStrength::{Strong, Weak};

    fn matcher(start: Instant) -> RhythmMatcher {
        let pattern = BeatPattern::new(120.0, 4, vec![Strong, Weak, Strong, Weak]).unwrap();
        let grid = BeatGrid::new(start, 0, Duration::from_millis(500));
        RhythmMatcher::new(pattern, grid)
    }

    #[test]
    fn test_tap_on_strong_beat_matches() {
        let start = Instant::now();
        let matcher = matcher(start);
        let mut session = GameSession::new();

        let verdict = matcher.on_tap(&mut session, TapEvent::at(start + Duration::from_secs(1)));
        assert_eq!(
            verdict,
            MatchVerdict {
                tap_index: 0,
                expected: Strong,
                matched: true
            }
        );
    }

    #[test]
    fn test_tap_halfway_between_beats_misses() {
        let start = Instant::now();
        let matcher = matcher(start);
        let mut session = GameSession::new();

        let verdict = matcher.on_tap(&mut session, TapEvent::at(start + Duration::from_millis(250)));
        assert!(!verdict.matched);
    }

    #[test]
    fn test_tap_on_weak_beat_misses() {
        let start = Instant::now();
        let matcher = matcher(start);
        let mut session = GameSession::new();

        let verdict = matcher.on_tap(&mut session, TapEvent::at(start + Duration::from_millis(500)));
        assert_eq!(verdict.expected, Weak);
        assert!(!verdict.matched);
    }

    #[test]
    fn test_weak_target_matches_weak_beats() {
        let start = Instant::now();
        let matcher = matcher(start).with_target(Weak);
        let mut session = GameSession::new();

        let tap = TapEvent::at(start + Duration::from_millis(500));
        assert!(matcher.on_tap(&mut session, tap).matched);
        let tap = TapEvent::at(start + Duration::from_millis(1000));
        assert!(!matcher.on_tap(&mut session, tap).matched);
    }

    #[test]
    fn test_tolerance_scales_with_tempo() {
        let start = Instant::now();
        let slow = matcher(start);
        assert_eq!(slow.tolerance(), Duration::from_millis(125));

        let fast_grid = BeatGrid::new(start, 0, Duration::from_millis(250));
        let fast = RhythmMatcher::new(slow.pattern().clone(), fast_grid);
        assert_eq!(fast.tolerance(), Duration::from_micros(62_500));

        // 100ms late: inside the slow window, outside the fast one
        let tap = TapEvent::at(start + Duration::from_millis(1100));
        let mut session = GameSession::new();
        assert!(slow.on_tap(&mut session, tap).matched);
        let mut session = GameSession::new();
        assert!(!fast.on_tap(&mut session, tap).matched);
    }

    #[test]
    fn test_fixed_tolerance() {
        let start = Instant::now();
        let matcher = matcher(start).with_tolerance(ToleranceWindow::Fixed(Duration::from_millis(40)));
        let mut session = GameSession::new();

        let tap = TapEvent::at(start + Duration::from_millis(1030));
        assert!(matcher.on_tap(&mut session, tap).matched);
        let tap = TapEvent::at(start + Duration::from_millis(1060));
        assert!(!matcher.on_tap(&mut session, tap).matched);
    }

    #[test]
    fn test_each_tap_appends_one_verdict() {
        let start = Instant::now();
        let matcher = matcher(start);
        let mut session = GameSession::new();

        for ms in [0u64, 480, 1010, 1730] {
            matcher.on_tap(&mut session, TapEvent::at(start + Duration::from_millis(ms)));
        }

        assert_eq!(session.taps.len(), 4);
        assert_eq!(session.verdicts.len(), 4);
        let indices: Vec<_> = session.verdicts.iter().map(|v| v.tap_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_nearest_before_first_beat() {
        let start = Instant::now() + Duration::from_secs(5);
        let grid = BeatGrid::new(start, 0, Duration::from_millis(500));

        let (index, distance) = grid.nearest(start - Duration::from_millis(100));
        assert_eq!(index, 0);
        assert!((distance.as_secs_f64() - 0.1).abs() < 1e-6);

        // Far before the first beat still snaps to beat 0
        let (index, _) = grid.nearest(start - Duration::from_secs(3));
        assert_eq!(index, 0);
    }

    #[test]
    fn test_nearest_uses_anchor_index() {
        let anchor = Instant::now();
        let grid = BeatGrid::new(anchor, 6, Duration::from_millis(500));

        let (index, distance) = grid.nearest(anchor - Duration::from_millis(480));
        assert_eq!(index, 5);
        assert!(distance <= Duration::from_millis(21));
    }
}
