use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use cadence_core::modules::{now, sleep_until_deadline};
use cadence_core::{
    chord_frequencies, AsyncModule, BeatStrength, EngineCommand, EngineError, EngineEvent,
    ModuleEvent, ModuleId, ModuleMessage, NoteName, VoiceKey,
};
use tokio::sync::mpsc;

use crate::voice::{click_frequency, VoiceParams};
use crate::voice_engine::{VoiceEngine, VoiceEvent};

/// Plays piano notes, chords and the metronome click.
pub struct SynthModule {
    engine: VoiceEngine,
    click_enabled: bool,
    status: HashMap<String, String>,
}

impl SynthModule {
    pub fn new(engine: VoiceEngine, click_enabled: bool) -> Self {
        Self {
            engine,
            click_enabled,
            status: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &VoiceEngine {
        &self.engine
    }

    fn update_status(&mut self) {
        let output = match self.engine.unavailable_reason() {
            Some(_) => "unavailable",
            None if self.engine.has_device() => "device",
            None => "detached",
        };
        self.status.insert("output".to_string(), output.to_string());
        self.status
            .insert("voices".to_string(), self.engine.live_count().to_string());
        self.status
            .insert("volume".to_string(), format!("{:.2}", self.engine.volume()));
        self.status
            .insert("click".to_string(), self.click_enabled.to_string());
    }

    fn handle_command(&mut self, command: EngineCommand, at: Instant) -> Result<(), EngineError> {
        match command {
            EngineCommand::PlayNote { note } => {
                let name: NoteName = note.parse()?;
                self.engine.start(
                    VoiceKey::Note(name),
                    name.frequency(),
                    VoiceParams::sustained(),
                    at,
                );
            }
            EngineCommand::StopNote { note } => {
                let name: NoteName = note.parse()?;
                self.engine.stop(&VoiceKey::Note(name));
            }
            EngineCommand::PlayChord { symbol, root } => {
                let frequencies = chord_frequencies(&symbol, &root)?;
                self.stop_chord();
                log::debug!("Playing {}{} ({} tones)", root, symbol, frequencies.len());
                for (index, frequency) in frequencies.into_iter().enumerate() {
                    self.engine.start(
                        VoiceKey::ChordTone(index),
                        frequency,
                        VoiceParams::chord_tone(),
                        at,
                    );
                }
            }
            EngineCommand::SetVolume { volume } => self.engine.set_volume(volume),
            EngineCommand::SetClickEnabled { enabled } => {
                self.click_enabled = enabled;
                if !enabled {
                    self.engine.stop(&VoiceKey::Click);
                }
            }
            EngineCommand::StopAll => self.engine.stop_all(),
            other => {
                log::debug!("Synth module ignoring {:?}", other);
            }
        }
        Ok(())
    }

    /// Replace the previous chord rather than stacking on it.
    fn stop_chord(&mut self) {
        let chord_tones: Vec<VoiceKey> = self
            .engine
            .sounding()
            .into_iter()
            .filter(|key| matches!(key, VoiceKey::ChordTone(_)))
            .collect();
        for key in &chord_tones {
            self.engine.stop(key);
        }
    }

    fn click(&mut self, strength: BeatStrength, at: Instant) {
        if self.click_enabled {
            self.engine.start(
                VoiceKey::Click,
                click_frequency(strength),
                VoiceParams::click(),
                at,
            );
        }
    }

    async fn flush_events(&mut self, tx: &mpsc::Sender<ModuleMessage>) {
        for event in self.engine.take_events() {
            let event = match event {
                VoiceEvent::Started(key) => EngineEvent::VoiceStarted { key },
                VoiceEvent::Stopped(key) => EngineEvent::VoiceStopped { key },
            };
            let _ = tx
                .send(ModuleMessage::Event(ModuleEvent::Notify(event)))
                .await;
        }
    }
}

#[async_trait]
impl AsyncModule for SynthModule {
    fn id(&self) -> ModuleId {
        ModuleId::Synth
    }

    async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::info!(
            "Initializing synth module ({} Hz)",
            self.engine.sample_rate()
        );
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
        log::info!("Synth module started");

        if let Some(reason) = self.engine.unavailable_reason() {
            let event = EngineEvent::AudioUnavailable {
                reason: reason.to_string(),
            };
            let _ = tx
                .send(ModuleMessage::Event(ModuleEvent::Notify(event)))
                .await;
        }
        let _ = tx
            .send(ModuleMessage::Status("Synth module running".to_string()))
            .await;

        loop {
            let auto_stop = self.engine.next_deadline();

            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(ModuleEvent::Command(EngineCommand::Shutdown))
                        | Some(ModuleEvent::Shutdown)
                        | None => {
                            log::info!("Synth module received shutdown signal");
                            break;
                        }
                        Some(ModuleEvent::Command(command)) => {
                            if let Err(e) = self.handle_command(command, now()) {
                                log::warn!("Synth command rejected: {}", e);
                                let event = EngineEvent::Error { message: e.to_string() };
                                let _ = tx
                                    .send(ModuleMessage::Event(ModuleEvent::Notify(event)))
                                    .await;
                            }
                        }
                        Some(ModuleEvent::Beat { strength, .. }) => {
                            self.click(strength, now());
                        }
                        Some(_) => {}
                    }
                }

                _ = sleep_until_deadline(auto_stop) => {
                    self.engine.reap_expired(now());
                }
            }

            self.flush_events(&tx).await;
            self.update_status();
        }

        log::info!("Synth module shutting down");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.engine.stop_all();
        self.status
            .insert("status".to_string(), "shutdown".to_string());
        log::info!("Synth module shutdown complete");
        Ok(())
    }

    fn status(&self) -> HashMap<String, String> {
        self.status.clone()
    }
}
