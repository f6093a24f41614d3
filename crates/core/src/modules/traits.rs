use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::messages::{EngineCommand, EngineEvent};
use crate::rhythm::pattern::BeatStrength;

/// Unique identifier for each module type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleId {
    Rhythm,
    Synth,
}

impl ModuleId {
    /// Modules that act on `command`. Shutdown goes to every module.
    pub fn owners(command: &EngineCommand) -> &'static [ModuleId] {
        match command {
            EngineCommand::ConfigurePattern { .. }
            | EngineCommand::StartClock
            | EngineCommand::StopClock
            | EngineCommand::StartRound { .. }
            | EngineCommand::RegisterTap { .. }
            | EngineCommand::FinishRound => &[ModuleId::Rhythm],
            EngineCommand::PlayNote { .. }
            | EngineCommand::StopNote { .. }
            | EngineCommand::PlayChord { .. }
            | EngineCommand::SetVolume { .. }
            | EngineCommand::SetClickEnabled { .. }
            | EngineCommand::StopAll => &[ModuleId::Synth],
            EngineCommand::Shutdown => &[ModuleId::Rhythm, ModuleId::Synth],
        }
    }
}

/// Events that can be sent between modules
#[derive(Debug, Clone)]
pub enum ModuleEvent {
    /// Front-end command routed to the owning module
    Command(EngineCommand),
    /// Beat fired by the rhythm module, forwarded to the synth for the click
    Beat {
        index: usize,
        strength: BeatStrength,
    },
    /// Notification for the front end
    Notify(EngineEvent),
    /// System events
    Shutdown,
}

/// Messages passed between modules and the module manager
#[derive(Debug)]
pub enum ModuleMessage {
    Event(ModuleEvent),
    Status(String),
    Error(String),
}

/// Trait that all async modules must implement
#[async_trait]
pub trait AsyncModule: Send + Sync {
    /// Get the unique identifier for this module
    fn id(&self) -> ModuleId;

    /// Initialize the module (called once at startup)
    async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Start the module's main loop
    async fn run(
        &mut self,
        mut rx: mpsc::Receiver<ModuleEvent>,
        tx: mpsc::Sender<ModuleMessage>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Shutdown the module gracefully
    async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Get the module's status
    fn status(&self) -> HashMap<String, String>;
}

/// Sleep until `deadline`, or forever when there is none.
///
/// Lets a module put an optional timer into `tokio::select!`.
pub async fn sleep_until_deadline(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending::<()>().await,
    }
}

/// Current time on the tokio clock, so paused test clocks apply.
pub fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
