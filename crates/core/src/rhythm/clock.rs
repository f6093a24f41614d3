//! Drift-free beat clock.
//!
//! The clock never sleeps on its own. Its owner asks for [`BeatClock::next_deadline`],
//! waits until then on whatever timer the host provides, and calls
//! [`BeatClock::poll`]. Every beat is scheduled from the previous beat's
//! *target* time, so a late wake-up delays one callback but never shifts the
//! grid.

use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use super::matcher::BeatGrid;
use super::pattern::{BeatPattern, BeatStrength};
use crate::error::EngineError;

/// Per-beat callback. Returning `ControlFlow::Break` stops the clock.
pub type BeatCallback = Box<dyn FnMut(usize, BeatStrength) -> ControlFlow<()> + Send + Sync>;

/// Position of a running clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    pub current_beat_index: usize,
    pub next_fire_at: Instant,
}

/// A fired beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub index: usize,
    pub strength: BeatStrength,
    /// When the beat was due, not when it was processed.
    pub scheduled_at: Instant,
    /// 1-based position inside the measure.
    pub beat_in_measure: u8,
}

pub struct BeatClock {
    pattern: Option<BeatPattern>,
    /// Pattern change requested while running, applied at the next tick.
    pending: Option<BeatPattern>,
    state: Option<ClockState>,
    on_beat: Option<BeatCallback>,
}

impl BeatClock {
    pub fn new() -> Self {
        Self {
            pattern: None,
            pending: None,
            state: None,
            on_beat: None,
        }
    }

    pub fn with_pattern(pattern: BeatPattern) -> Self {
        let mut clock = Self::new();
        clock.pattern = Some(pattern);
        clock
    }

    /// Register the per-beat callback, replacing any previous one.
    pub fn set_on_beat(&mut self, callback: BeatCallback) {
        self.on_beat = Some(callback);
    }

    pub fn clear_on_beat(&mut self) {
        self.on_beat = None;
    }

    /// Install a new pattern.
    ///
    /// While running, the change waits for the next tick boundary: the beat
    /// that is already scheduled keeps its time.
    pub fn configure(&mut self, pattern: BeatPattern) {
        if self.is_running() {
            log::debug!("Pattern change queued for next beat ({} BPM)", pattern.bpm());
            self.pending = Some(pattern);
        } else {
            self.pattern = Some(pattern);
        }
    }

    /// Change only the tempo of the current pattern.
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), EngineError> {
        let current = self
            .pending
            .as_ref()
            .or(self.pattern.as_ref())
            .ok_or(EngineError::ClockNotConfigured)?;
        let pattern = BeatPattern::new(
            bpm,
            current.time_signature_numerator(),
            current.beats().to_vec(),
        )?;
        self.configure(pattern);
        Ok(())
    }

    /// The pattern that the next beat will use.
    pub fn pattern(&self) -> Option<&BeatPattern> {
        self.pending.as_ref().or(self.pattern.as_ref())
    }

    /// The pattern that scheduled the beats fired so far and the one that is
    /// due next. A queued change is not visible here until its first tick.
    pub fn active_pattern(&self) -> Option<&BeatPattern> {
        self.pattern.as_ref()
    }

    /// Transition to running. The first beat fires one interval after `now`.
    pub fn start(&mut self, now: Instant) -> Result<(), EngineError> {
        if self.is_running() {
            log::debug!("Beat clock already running");
            return Ok(());
        }
        if let Some(pending) = self.pending.take() {
            self.pattern = Some(pending);
        }
        let pattern = self.pattern.as_ref().ok_or(EngineError::ClockNotConfigured)?;

        self.state = Some(ClockState {
            current_beat_index: 0,
            next_fire_at: now + interval_of(pattern),
        });
        log::info!(
            "Beat clock started at {:.1} BPM ({} beats per cycle)",
            pattern.bpm(),
            pattern.beats().len()
        );
        Ok(())
    }

    /// Transition to stopped and forget the beat position. Safe to call at
    /// any time, including when already stopped.
    pub fn stop(&mut self) {
        if self.state.take().is_some() {
            log::info!("Beat clock stopped");
        }
        if let Some(pending) = self.pending.take() {
            self.pattern = Some(pending);
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&ClockState> {
        self.state.as_ref()
    }

    /// When the owner should wake up next. `None` while stopped.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.map(|s| s.next_fire_at)
    }

    /// Fire the scheduled beat.
    ///
    /// Returns `None` when the clock is stopped. The callback may stop the
    /// clock by returning `Break`; the tick is still reported.
    pub fn tick(&mut self) -> Option<Tick> {
        let state = self.state?;

        if let Some(pending) = self.pending.take() {
            self.pattern = Some(pending);
        }
        let pattern = self.pattern.as_ref()?;

        let index = state.current_beat_index;
        let strength = pattern.strength_at(index);
        let tick = Tick {
            index,
            strength,
            scheduled_at: state.next_fire_at,
            beat_in_measure: measure_position(pattern, index),
        };

        self.state = Some(ClockState {
            current_beat_index: index + 1,
            next_fire_at: state.next_fire_at + interval_of(pattern),
        });

        log::debug!("Beat {} ({:?})", index, strength);

        let stop_requested = match self.on_beat.as_mut() {
            Some(callback) => callback(index, strength).is_break(),
            None => false,
        };
        if stop_requested {
            self.stop();
        }

        Some(tick)
    }

    /// Fire every beat that is due at `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<Tick> {
        let mut fired = Vec::new();
        while let Some(deadline) = self.next_deadline() {
            if deadline > now {
                break;
            }
            match self.tick() {
                Some(tick) => fired.push(tick),
                None => break,
            }
        }
        if fired.len() > 1 {
            log::warn!("Beat clock woke late, fired {} beats at once", fired.len());
        }
        fired
    }

    /// 1-based beat in the measure of the beat that fires next.
    pub fn beat_in_measure(&self) -> Option<u8> {
        let state = self.state.as_ref()?;
        let pattern = self.pattern()?;
        Some(measure_position(pattern, state.current_beat_index))
    }

    /// Snapshot of the expected beat times, anchored on the upcoming beat.
    ///
    /// Built from the active pattern: the upcoming beat was scheduled with its
    /// interval, so a queued change only shows up once it has fired.
    pub fn grid(&self) -> Option<BeatGrid> {
        let state = self.state.as_ref()?;
        let pattern = self.active_pattern()?;
        Some(BeatGrid::new(
            state.next_fire_at,
            state.current_beat_index,
            interval_of(pattern),
        ))
    }
}

impl Default for BeatClock {
    fn default() -> Self {
        Self::new()
    }
}

fn interval_of(pattern: &BeatPattern) -> Duration {
    Duration::from_secs_f64(pattern.interval_seconds())
}

fn measure_position(pattern: &BeatPattern, index: usize) -> u8 {
    (index % pattern.time_signature_numerator() as usize) as u8 + 1
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::rhythm::pattern::BeatStrength::{Strong, Weak};

    fn pattern_120() -> BeatPattern {
        BeatPattern::new(120.0, 4, vec![Strong, Weak, Strong, Weak]).unwrap()
    }

    #[test]
    fn test_start_requires_pattern() {
        let mut clock = BeatClock::new();
        assert_eq!(
            clock.start(Instant::now()),
            Err(EngineError::ClockNotConfigured)
        );
        assert!(!clock.is_running());
    }

    #[test]
    fn test_fires_eight_ticks_in_four_seconds() {
        let start = Instant::now();
        let mut clock = BeatClock::with_pattern(pattern_120());
        clock.start(start).unwrap();

        let ticks = clock.poll(start + Duration::from_millis(4000));
        assert_eq!(ticks.len(), 8);
        assert_eq!(ticks[7].scheduled_at, start + Duration::from_secs(4));
        assert_eq!(
            ticks.iter().map(|t| t.strength).collect::<Vec<_>>(),
            vec![Strong, Weak, Strong, Weak, Strong, Weak, Strong, Weak]
        );
    }

    #[test]
    fn test_late_polls_do_not_drift() {
        let start = Instant::now();
        let mut clock = BeatClock::with_pattern(pattern_120());
        clock.start(start).unwrap();

        // Wake 30ms late for every beat; targets stay on the 500ms grid.
        let mut all = Vec::new();
        for n in 1..=100u32 {
            let wake = start + Duration::from_millis(500) * n + Duration::from_millis(30);
            all.extend(clock.poll(wake));
        }

        assert_eq!(all.len(), 100);
        assert_eq!(all[99].scheduled_at, start + Duration::from_secs(50));
        assert_eq!(
            clock.next_deadline(),
            Some(start + Duration::from_millis(50_500))
        );
    }

    #[test]
    fn test_stop_resets_and_cancels() {
        let start = Instant::now();
        let mut clock = BeatClock::with_pattern(pattern_120());
        clock.start(start).unwrap();
        clock.poll(start + Duration::from_millis(1600));
        assert_eq!(clock.state().unwrap().current_beat_index, 3);

        clock.stop();
        assert!(!clock.is_running());
        assert_eq!(clock.next_deadline(), None);
        assert!(clock.poll(start + Duration::from_secs(60)).is_empty());
        assert!(clock.tick().is_none());

        clock.start(start + Duration::from_secs(10)).unwrap();
        assert_eq!(clock.state().unwrap().current_beat_index, 0);
    }

    #[test]
    fn test_callback_can_stop_clock() {
        let start = Instant::now();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let mut clock = BeatClock::with_pattern(pattern_120());
        clock.set_on_beat(Box::new(move |index, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            if index == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }));
        clock.start(start).unwrap();

        let ticks = clock.poll(start + Duration::from_secs(10));
        assert_eq!(ticks.len(), 3);
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_bpm_change_applies_at_next_boundary() {
        let start = Instant::now();
        let mut clock = BeatClock::with_pattern(pattern_120());
        clock.start(start).unwrap();
        clock.poll(start + Duration::from_millis(500));

        // Already scheduled for 1000ms; must not move.
        clock.set_bpm(60.0).unwrap();
        assert_eq!(
            clock.next_deadline(),
            Some(start + Duration::from_millis(1000))
        );

        let tick = clock.poll(start + Duration::from_millis(1000));
        assert_eq!(tick.len(), 1);
        // After the boundary the 1s interval is in effect.
        assert_eq!(
            clock.next_deadline(),
            Some(start + Duration::from_millis(2000))
        );
    }

    #[test]
    fn test_grid_ignores_queued_change() {
        let start = Instant::now();
        let mut clock = BeatClock::with_pattern(pattern_120());
        clock.start(start).unwrap();
        clock.poll(start + Duration::from_millis(500));

        clock.set_bpm(60.0).unwrap();
        assert_eq!(clock.pattern().map(|p| p.bpm()), Some(60.0));
        assert_eq!(clock.active_pattern().map(|p| p.bpm()), Some(120.0));

        let grid = clock.grid().unwrap();
        assert_eq!(grid.interval, Duration::from_millis(500));
        assert_eq!(grid.anchor, start + Duration::from_millis(1000));
        assert_eq!(grid.anchor_index, 1);

        // Once the boundary passes, the new tempo drives the grid.
        clock.poll(start + Duration::from_millis(1000));
        let grid = clock.grid().unwrap();
        assert_eq!(grid.interval, Duration::from_secs(1));
        assert_eq!(grid.anchor, start + Duration::from_millis(2000));
    }

    #[test]
    fn test_clock_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BeatClock>();
        assert_send_sync::<BeatCallback>();
    }

    #[test]
    fn test_beat_in_measure_wraps_on_numerator() {
        let start = Instant::now();
        let pattern = BeatPattern::new(120.0, 3, vec![Strong, Weak]).unwrap();
        let mut clock = BeatClock::with_pattern(pattern);
        clock.start(start).unwrap();

        let ticks = clock.poll(start + Duration::from_secs(2));
        let measure: Vec<u8> = ticks.iter().map(|t| t.beat_in_measure).collect();
        assert_eq!(measure, vec![1, 2, 3, 1]);
        // Strength still cycles on the pattern length
        assert_eq!(ticks[2].strength, Strong);
    }
}
