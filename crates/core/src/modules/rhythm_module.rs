use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{now, sleep_until_deadline, AsyncModule, ModuleEvent, ModuleId, ModuleMessage};
use crate::error::EngineError;
use crate::game::score_keeper::ScoreKeeper;
use crate::messages::{EngineCommand, EngineEvent, Settings};
use crate::rhythm::clock::BeatClock;
use crate::rhythm::matcher::{RhythmMatcher, TapEvent, ToleranceWindow};
use crate::rhythm::pattern::BeatPattern;

/// Owns the beat clock and the running rhythm round.
pub struct RhythmModule {
    clock: BeatClock,
    round: Option<ScoreKeeper>,
    tolerance: ToleranceWindow,
    round_length: Duration,
    status: HashMap<String, String>,
}

impl RhythmModule {
    pub fn new(settings: &Settings) -> Self {
        Self {
            clock: BeatClock::new(),
            round: None,
            tolerance: settings.tolerance(),
            round_length: settings.round_length(),
            status: HashMap::new(),
        }
    }

    /// Start with a pattern already installed.
    pub fn with_pattern(settings: &Settings, pattern: BeatPattern) -> Self {
        let mut module = Self::new(settings);
        module.clock.configure(pattern);
        module
    }

    /// Judge taps against the beats the clock actually scheduled.
    fn matcher(&self) -> Result<RhythmMatcher, EngineError> {
        let pattern = self
            .clock
            .active_pattern()
            .ok_or(EngineError::ClockNotConfigured)?;
        let grid = self.clock.grid().ok_or(EngineError::ClockNotConfigured)?;
        Ok(RhythmMatcher::new(pattern.clone(), grid).with_tolerance(self.tolerance))
    }

    fn update_status(&mut self) {
        self.status.insert(
            "clock".to_string(),
            if self.clock.is_running() { "running" } else { "stopped" }.to_string(),
        );
        if let Some(pattern) = self.clock.pattern() {
            self.status
                .insert("bpm".to_string(), format!("{:.1}", pattern.bpm()));
        }
        let round = match &self.round {
            Some(keeper) if !keeper.session().is_finalized() => "active",
            Some(_) => "finished",
            None => "none",
        };
        self.status.insert("round".to_string(), round.to_string());
    }

    /// Apply one command. Returns the notifications it produced.
    fn handle_command(
        &mut self,
        command: EngineCommand,
        at: Instant,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let mut events = Vec::new();
        match command {
            EngineCommand::ConfigurePattern {
                bpm,
                numerator,
                beats,
            } => {
                let pattern = BeatPattern::new(bpm, numerator, beats)?;
                self.clock.configure(pattern);
            }
            EngineCommand::StartClock => {
                if !self.clock.is_running() {
                    self.clock.start(at)?;
                    let bpm = self.clock.pattern().map(|p| p.bpm()).unwrap_or_default();
                    events.push(EngineEvent::ClockStarted { bpm });
                }
            }
            EngineCommand::StopClock => {
                if self.clock.is_running() {
                    self.clock.stop();
                    events.push(EngineEvent::ClockStopped);
                }
                // Taps cannot be judged without a grid
                events.extend(self.finish_round());
            }
            EngineCommand::StartRound { time_limit } => {
                if !self.clock.is_running() {
                    self.clock.start(at)?;
                    let bpm = self.clock.pattern().map(|p| p.bpm()).unwrap_or_default();
                    events.push(EngineEvent::ClockStarted { bpm });
                }
                let time_limit = time_limit.unwrap_or(self.round_length);
                self.round = Some(ScoreKeeper::with_deadline(at, time_limit));
                log::info!("Rhythm round started ({}s)", time_limit.as_secs());
                events.push(EngineEvent::RoundStarted { time_limit });
            }
            EngineCommand::RegisterTap { at: tapped_at } => {
                let keeper = self.round.as_ref().ok_or(EngineError::NoActiveRound)?;
                if keeper.session().is_finalized() {
                    return Err(EngineError::SessionFinalized);
                }
                let matcher = self.matcher()?;
                let keeper = self.round.as_mut().ok_or(EngineError::NoActiveRound)?;
                let verdict = keeper.register_tap(&matcher, TapEvent::at(tapped_at))?;
                events.push(EngineEvent::TapScored(verdict));
            }
            EngineCommand::FinishRound => {
                if self.round.is_none() {
                    return Err(EngineError::NoActiveRound);
                }
                events.extend(self.finish_round());
            }
            other => {
                log::debug!("Rhythm module ignoring {:?}", other);
            }
        }
        Ok(events)
    }

    fn finish_round(&mut self) -> Option<EngineEvent> {
        let keeper = self.round.as_mut()?;
        if keeper.session().is_finalized() {
            return None;
        }
        let summary = keeper.finalize();
        Some(EngineEvent::SessionFinalized {
            score: summary.score,
            accuracy: summary.accuracy,
            mistakes: summary.mistakes,
        })
    }

    /// End the round once its time limit has passed. The clock stops with it.
    fn expire_round(&mut self, at: Instant) -> Vec<EngineEvent> {
        let Some(summary) = self.round.as_mut().and_then(|keeper| keeper.expire(at)) else {
            return Vec::new();
        };
        log::info!("Rhythm round time is up");

        let mut events = Vec::new();
        if self.clock.is_running() {
            self.clock.stop();
            events.push(EngineEvent::ClockStopped);
        }
        events.push(EngineEvent::SessionFinalized {
            score: summary.score,
            accuracy: summary.accuracy,
            mistakes: summary.mistakes,
        });
        events
    }

    fn round_deadline(&self) -> Option<Instant> {
        self.round.as_ref().and_then(|keeper| keeper.deadline())
    }
}

async fn notify(tx: &mpsc::Sender<ModuleMessage>, event: EngineEvent) {
    let _ = tx
        .send(ModuleMessage::Event(ModuleEvent::Notify(event)))
        .await;
}

#[async_trait]
impl AsyncModule for RhythmModule {
    fn id(&self) -> ModuleId {
        ModuleId::Rhythm
    }

    async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::info!("Initializing rhythm module");
        self.status
            .insert("status".to_string(), "initialized".to_string());
        self.update_status();
        Ok(())
    }

    async fn run(
        &mut self,
        mut rx: mpsc::Receiver<ModuleEvent>,
        tx: mpsc::Sender<ModuleMessage>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::info!("Rhythm module started");

        let _ = tx
            .send(ModuleMessage::Status("Rhythm module running".to_string()))
            .await;

        loop {
            let beat_deadline = self.clock.next_deadline();
            let round_deadline = self.round_deadline();

            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(ModuleEvent::Command(EngineCommand::Shutdown))
                        | Some(ModuleEvent::Shutdown)
                        | None => {
                            log::info!("Rhythm module received shutdown signal");
                            break;
                        }
                        Some(ModuleEvent::Command(command)) => {
                            match self.handle_command(command, now()) {
                                Ok(events) => {
                                    for event in events {
                                        notify(&tx, event).await;
                                    }
                                }
                                Err(e) => {
                                    log::warn!("Rhythm command rejected: {}", e);
                                    notify(&tx, EngineEvent::Error { message: e.to_string() }).await;
                                }
                            }
                            self.update_status();
                        }
                        Some(_) => {
                            // Rhythm module only handles commands
                        }
                    }
                }

                _ = sleep_until_deadline(beat_deadline) => {
                    for tick in self.clock.poll(now()) {
                        let _ = tx
                            .send(ModuleMessage::Event(ModuleEvent::Beat {
                                index: tick.index,
                                strength: tick.strength,
                            }))
                            .await;
                        notify(&tx, EngineEvent::Beat {
                            index: tick.index,
                            strength: tick.strength,
                            beat_in_measure: tick.beat_in_measure,
                        }).await;
                    }
                }

                _ = sleep_until_deadline(round_deadline) => {
                    for event in self.expire_round(now()) {
                        notify(&tx, event).await;
                    }
                    self.update_status();
                }
            }
        }

        log::info!("Rhythm module shutting down");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.clock.stop();
        self.finish_round();
        self.status
            .insert("status".to_string(), "shutdown".to_string());
        log::info!("Rhythm module shutdown complete");
        Ok(())
    }

    fn status(&self) -> HashMap<String, String> {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use tokio::task::JoinHandle;

    use super::*;
    use crate::rhythm::matcher::MatchVerdict;
    use crate::rhythm::pattern::BeatStrength::{self, Strong, Weak};

    fn pattern_120() -> BeatPattern {
        BeatPattern::new(120.0, 4, vec![Strong, Weak, Strong, Weak]).unwrap()
    }

    fn spawn(
        mut module: RhythmModule,
    ) -> (
        mpsc::Sender<ModuleEvent>,
        mpsc::Receiver<ModuleMessage>,
        JoinHandle<()>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(100);
        let (message_tx, message_rx) = mpsc::channel(1000);
        let handle = tokio::spawn(async move {
            module.run(event_rx, message_tx).await.unwrap();
        });
        (event_tx, message_rx, handle)
    }

    fn notifications(rx: &mut mpsc::Receiver<ModuleMessage>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let ModuleMessage::Event(ModuleEvent::Notify(event)) = message {
                events.push(event);
            }
        }
        events
    }

    fn beats(events: &[EngineEvent]) -> Vec<BeatStrength> {
        events
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Beat { strength, .. } => Some(*strength),
                _ => None,
            })
            .collect()
    }

    async fn command(tx: &mpsc::Sender<ModuleEvent>, command: EngineCommand) {
        tx.send(ModuleEvent::Command(command)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_emits_beats() {
        let module = RhythmModule::with_pattern(&Settings::default(), pattern_120());
        let (tx, mut rx, handle) = spawn(module);

        command(&tx, EngineCommand::StartClock).await;
        tokio::time::sleep(Duration::from_millis(2100)).await;
        tx.send(ModuleEvent::Shutdown).await.unwrap();
        handle.await.unwrap();

        let events = notifications(&mut rx);
        assert_eq!(events[0], EngineEvent::ClockStarted { bpm: 120.0 });
        assert_eq!(beats(&events), vec![Strong, Weak, Strong, Weak]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_beats_after_stop() {
        let module = RhythmModule::with_pattern(&Settings::default(), pattern_120());
        let (tx, mut rx, handle) = spawn(module);

        command(&tx, EngineCommand::StartClock).await;
        tokio::time::sleep(Duration::from_millis(1200)).await;
        command(&tx, EngineCommand::StopClock).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(ModuleEvent::Shutdown).await.unwrap();
        handle.await.unwrap();

        let events = notifications(&mut rx);
        assert_eq!(beats(&events).len(), 2);
        assert_eq!(events.last(), Some(&EngineEvent::ClockStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_scores_taps() {
        let module = RhythmModule::with_pattern(&Settings::default(), pattern_120());
        let (tx, mut rx, handle) = spawn(module);

        command(&tx, EngineCommand::StartRound { time_limit: None }).await;
        // Beat n is due (n + 1) * 500ms after the start; 0 and 2 are strong.
        tokio::time::sleep(Duration::from_millis(500)).await;
        command(&tx, EngineCommand::RegisterTap { at: now() }).await;
        tokio::time::sleep(Duration::from_millis(1000)).await;
        command(&tx, EngineCommand::RegisterTap { at: now() }).await;
        tokio::time::sleep(Duration::from_millis(450)).await;
        command(&tx, EngineCommand::RegisterTap { at: now() }).await;
        command(&tx, EngineCommand::FinishRound).await;
        tx.send(ModuleEvent::Shutdown).await.unwrap();
        handle.await.unwrap();

        let events = notifications(&mut rx);
        let verdicts: Vec<bool> = events
            .iter()
            .filter_map(|event| match event {
                EngineEvent::TapScored(verdict) => Some(verdict.matched),
                _ => None,
            })
            .collect();
        assert_eq!(verdicts, vec![true, true, false]);

        let finalized = events
            .iter()
            .find_map(|event| match event {
                EngineEvent::SessionFinalized {
                    score,
                    accuracy,
                    mistakes,
                } => Some((*score, *accuracy, *mistakes)),
                _ => None,
            })
            .unwrap();
        assert_eq!(finalized.0, 22);
        assert!((finalized.1 - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(finalized.2, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_expires() {
        let module = RhythmModule::with_pattern(&Settings::default(), pattern_120());
        let (tx, mut rx, handle) = spawn(module);

        command(
            &tx,
            EngineCommand::StartRound {
                time_limit: Some(Duration::from_millis(2250)),
            },
        )
        .await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        command(&tx, EngineCommand::RegisterTap { at: now() }).await;
        tx.send(ModuleEvent::Shutdown).await.unwrap();
        handle.await.unwrap();

        let events = notifications(&mut rx);
        // Beats at 500ms..2000ms; the one due at 2500ms never fires.
        assert_eq!(beats(&events).len(), 4);
        let expired = events
            .iter()
            .position(|event| *event == EngineEvent::ClockStopped)
            .unwrap();
        assert_eq!(
            events[expired + 1],
            EngineEvent::SessionFinalized {
                score: 0,
                accuracy: 0.0,
                mistakes: 0
            }
        );
        assert_eq!(
            events.last(),
            Some(&EngineEvent::Error {
                message: EngineError::SessionFinalized.to_string()
            })
        );
    }

    #[test]
    fn test_command_errors() {
        let start = Instant::now();
        let mut module = RhythmModule::new(&Settings::default());

        assert_eq!(
            module.handle_command(EngineCommand::RegisterTap { at: start }, start),
            Err(EngineError::NoActiveRound)
        );
        assert_eq!(
            module.handle_command(EngineCommand::StartClock, start),
            Err(EngineError::ClockNotConfigured)
        );

        let invalid = EngineCommand::ConfigurePattern {
            bpm: 120.0,
            numerator: 4,
            beats: vec![],
        };
        assert!(matches!(
            module.handle_command(invalid, start),
            Err(EngineError::InvalidPattern(_))
        ));
        assert!(!module.clock.is_running());
    }

    #[test]
    fn test_queued_pattern_does_not_rejudge_fired_beats() {
        let start = Instant::now();
        let mut module = RhythmModule::with_pattern(&Settings::default(), pattern_120());
        module
            .handle_command(EngineCommand::StartRound { time_limit: None }, start)
            .unwrap();

        let half = start + Duration::from_millis(500);
        let fired = module.clock.poll(half);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].strength, Strong);

        // Queued until the beat at 1000ms fires
        module
            .handle_command(
                EngineCommand::ConfigurePattern {
                    bpm: 60.0,
                    numerator: 4,
                    beats: vec![Weak, Strong, Weak, Strong],
                },
                half,
            )
            .unwrap();

        let events = module
            .handle_command(EngineCommand::RegisterTap { at: half }, half)
            .unwrap();
        assert_eq!(
            events,
            vec![EngineEvent::TapScored(MatchVerdict {
                tap_index: 0,
                expected: Strong,
                matched: true,
            })]
        );
    }

    #[test]
    fn test_expiry_stops_clock() {
        let start = Instant::now();
        let mut module = RhythmModule::with_pattern(&Settings::default(), pattern_120());
        module
            .handle_command(
                EngineCommand::StartRound {
                    time_limit: Some(Duration::from_secs(2)),
                },
                start,
            )
            .unwrap();

        assert!(module.expire_round(start + Duration::from_secs(1)).is_empty());
        assert!(module.clock.is_running());

        let events = module.expire_round(start + Duration::from_secs(2));
        assert_eq!(events[0], EngineEvent::ClockStopped);
        assert!(matches!(events[1], EngineEvent::SessionFinalized { .. }));
        assert!(!module.clock.is_running());
        assert!(module.expire_round(start + Duration::from_secs(3)).is_empty());
    }

    #[test]
    fn test_module_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RhythmModule>();
    }

    #[test]
    fn test_stop_clock_finalizes_round() {
        let start = Instant::now();
        let mut module = RhythmModule::with_pattern(&Settings::default(), pattern_120());

        module
            .handle_command(EngineCommand::StartRound { time_limit: None }, start)
            .unwrap();
        let events = module
            .handle_command(EngineCommand::StopClock, start + Duration::from_secs(1))
            .unwrap();

        assert_eq!(events[0], EngineEvent::ClockStopped);
        assert!(matches!(events[1], EngineEvent::SessionFinalized { .. }));
        assert_eq!(
            module.handle_command(
                EngineCommand::RegisterTap {
                    at: start + Duration::from_secs(1)
                },
                start + Duration::from_secs(1)
            ),
            Err(EngineError::SessionFinalized)
        );
    }
}
