//! Front-end handle to the running engine.
//!
//! Wires the rhythm and synth modules together through the module manager
//! and routes their messages: beats go to the synth for the click, and every
//! notification is fanned out on a broadcast channel.

use std::time::{Duration, Instant};

use cadence_core::modules::now;
use cadence_core::{
    BeatPattern, BeatStrength, EngineCommand, EngineError, EngineEvent, ModuleEvent, ModuleId,
    ModuleManager, ModuleMessage, RhythmModule, Settings,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::audio_output::AudioOutputConfig;
use crate::synth_module::SynthModule;
use crate::voice_engine::VoiceEngine;

const EVENT_CAPACITY: usize = 1024;

pub struct Engine {
    /// `None` once shut down.
    manager: Option<ModuleManager>,
    events: broadcast::Sender<EngineEvent>,
    router: Option<JoinHandle<()>>,
    audio_error: Option<String>,
}

impl Engine {
    /// Open the configured audio device and start every module.
    pub async fn start(settings: &Settings) -> Result<Self, EngineError> {
        let voices = VoiceEngine::open(&AudioOutputConfig::from(settings));
        Self::start_with(settings, voices).await
    }

    /// Start with a voice engine the caller has already set up.
    pub async fn start_with(
        settings: &Settings,
        mut voices: VoiceEngine,
    ) -> Result<Self, EngineError> {
        voices.set_volume(settings.master_volume);
        let audio_error = voices.unavailable_reason().map(str::to_string);

        let pattern = BeatPattern::metronome(settings.default_bpm, settings.time_signature())?;
        let mut manager = ModuleManager::new();
        manager.register(Box::new(RhythmModule::with_pattern(settings, pattern)));
        manager.register(Box::new(SynthModule::new(voices, settings.click_enabled)));

        let message_rx = manager.start().await?;
        let synth_tx = manager
            .sender(ModuleId::Synth)
            .ok_or_else(|| EngineError::ChannelClosed("synth module".to_string()))?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let router = tokio::spawn(route_messages(message_rx, synth_tx, events.clone()));

        log::info!("Engine started");
        Ok(Self {
            manager: Some(manager),
            events,
            router: Some(router),
            audio_error,
        })
    }

    /// Receive every notification published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Why the audio device could not be opened, if it could not.
    pub fn audio_error(&self) -> Option<&str> {
        self.audio_error.as_deref()
    }

    /// Deliver a command to the module that owns it.
    pub async fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        match &self.manager {
            Some(manager) => manager.dispatch(command).await,
            None => Err(EngineError::ChannelClosed("engine shut down".to_string())),
        }
    }

    pub async fn configure_pattern(
        &self,
        bpm: f64,
        numerator: u8,
        beats: Vec<BeatStrength>,
    ) -> Result<(), EngineError> {
        self.send(EngineCommand::ConfigurePattern {
            bpm,
            numerator,
            beats,
        })
        .await
    }

    pub async fn start_clock(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::StartClock).await
    }

    pub async fn stop_clock(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::StopClock).await
    }

    pub async fn play_note(&self, note: &str) -> Result<(), EngineError> {
        self.send(EngineCommand::PlayNote {
            note: note.to_string(),
        })
        .await
    }

    pub async fn stop_note(&self, note: &str) -> Result<(), EngineError> {
        self.send(EngineCommand::StopNote {
            note: note.to_string(),
        })
        .await
    }

    pub async fn play_chord(&self, symbol: &str, root: &str) -> Result<(), EngineError> {
        self.send(EngineCommand::PlayChord {
            symbol: symbol.to_string(),
            root: root.to_string(),
        })
        .await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<(), EngineError> {
        self.send(EngineCommand::SetVolume { volume }).await
    }

    pub async fn set_click_enabled(&self, enabled: bool) -> Result<(), EngineError> {
        self.send(EngineCommand::SetClickEnabled { enabled }).await
    }

    pub async fn stop_all(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::StopAll).await
    }

    pub async fn start_round(&self, time_limit: Option<Duration>) -> Result<(), EngineError> {
        self.send(EngineCommand::StartRound { time_limit }).await
    }

    /// Register a tap at `at`.
    pub async fn register_tap(&self, at: Instant) -> Result<(), EngineError> {
        self.send(EngineCommand::RegisterTap { at }).await
    }

    /// Register a tap stamped with the current time.
    pub async fn tap(&self) -> Result<(), EngineError> {
        self.register_tap(now()).await
    }

    pub async fn finish_round(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::FinishRound).await
    }

    /// Stop every module and wait for the router to drain.
    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        let Some(mut manager) = self.manager.take() else {
            return Ok(());
        };
        // The message channel closes with the last module task, ending the router
        manager.shutdown().await;

        if let Some(router) = self.router.take() {
            if let Err(e) = router.await {
                log::error!("Message router error: {}", e);
            }
        }
        log::info!("Engine shut down");
        Ok(())
    }
}

async fn route_messages(
    mut rx: mpsc::Receiver<ModuleMessage>,
    synth_tx: mpsc::Sender<ModuleEvent>,
    events: broadcast::Sender<EngineEvent>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            ModuleMessage::Event(ModuleEvent::Beat { index, strength }) => {
                if synth_tx
                    .send(ModuleEvent::Beat { index, strength })
                    .await
                    .is_err()
                {
                    log::debug!("Synth module gone, beat {} not clicked", index);
                }
            }
            ModuleMessage::Event(ModuleEvent::Notify(event)) => {
                // No subscribers is fine
                let _ = events.send(event);
            }
            ModuleMessage::Event(other) => {
                log::debug!("Unrouted module event: {:?}", other);
            }
            ModuleMessage::Status(status) => {
                log::info!("{}", status);
            }
            ModuleMessage::Error(error) => {
                log::error!("{}", error);
                let _ = events.send(EngineEvent::Error { message: error });
            }
        }
    }
}
