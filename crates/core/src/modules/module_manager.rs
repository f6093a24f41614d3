//! Runs the engine modules as tokio tasks and routes commands to them.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::traits::{AsyncModule, ModuleEvent, ModuleId, ModuleMessage};
use crate::error::EngineError;
use crate::messages::EngineCommand;

const EVENT_CAPACITY: usize = 1000;
const MESSAGE_CAPACITY: usize = 1000;

/// A spawned module: its inbox and the task driving it.
struct RunningModule {
    tx: mpsc::Sender<ModuleEvent>,
    task: JoinHandle<()>,
}

pub struct ModuleManager {
    registered: Vec<Box<dyn AsyncModule>>,
    running: HashMap<ModuleId, RunningModule>,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self {
            registered: Vec::new(),
            running: HashMap::new(),
        }
    }

    /// Queue a module for [`ModuleManager::start`]. A later module with the
    /// same id replaces the earlier one.
    pub fn register(&mut self, module: Box<dyn AsyncModule>) {
        let id = module.id();
        self.registered.retain(|existing| existing.id() != id);
        self.registered.push(module);
    }

    /// Initialize every registered module, then spawn each one in its own task.
    ///
    /// Returns the receiving end of the channel all modules report on. It
    /// closes once every module task has finished.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<ModuleMessage>, EngineError> {
        if !self.running.is_empty() {
            return Err(EngineError::Module("modules already running".to_string()));
        }

        for module in &mut self.registered {
            let id = module.id();
            if let Err(e) = module.initialize().await {
                log::error!("Failed to initialize module {:?}: {}", id, e);
                return Err(EngineError::Module(format!("{:?}: {}", id, e)));
            }
            log::info!("Module {:?} initialized", id);
        }

        let (message_tx, message_rx) = mpsc::channel(MESSAGE_CAPACITY);
        for mut module in self.registered.drain(..) {
            let id = module.id();
            let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
            let messages = message_tx.clone();

            let task = tokio::spawn(async move {
                if let Err(e) = module.run(rx, messages.clone()).await {
                    let _ = messages
                        .send(ModuleMessage::Error(format!("Module {:?} error: {}", id, e)))
                        .await;
                }
                if let Err(e) = module.shutdown().await {
                    log::warn!("Module {:?} shutdown error: {}", id, e);
                }
            });

            self.running.insert(id, RunningModule { tx, task });
        }

        Ok(message_rx)
    }

    /// Inbox of a running module, for tasks that forward events on their own.
    pub fn sender(&self, id: ModuleId) -> Option<mpsc::Sender<ModuleEvent>> {
        self.running.get(&id).map(|module| module.tx.clone())
    }

    /// Deliver `command` to every module that owns it.
    pub async fn dispatch(&self, command: EngineCommand) -> Result<(), EngineError> {
        let owners = ModuleId::owners(&command);
        for id in owners {
            let module = self
                .running
                .get(id)
                .ok_or_else(|| EngineError::ChannelClosed(format!("{:?} module not running", id)))?;
            module
                .tx
                .send(ModuleEvent::Command(command.clone()))
                .await
                .map_err(|_| EngineError::ChannelClosed(format!("{:?} module", id)))?;
        }
        Ok(())
    }

    /// Ask every module to stop and wait for its task. Safe to call twice.
    pub async fn shutdown(&mut self) {
        if self.running.is_empty() {
            return;
        }
        log::info!("Shutting down modules...");

        for (id, module) in &self.running {
            if module.tx.send(ModuleEvent::Shutdown).await.is_err() {
                log::debug!("Module {:?} already stopped", id);
            }
        }
        for (id, module) in self.running.drain() {
            if let Err(e) = module.task.await {
                log::error!("Module {:?} task failed: {}", id, e);
            }
        }
        log::info!("All modules stopped");
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;

    /// Reports every command it receives as a status line.
    struct Recorder {
        id: ModuleId,
        fail_init: bool,
    }

    impl Recorder {
        fn boxed(id: ModuleId) -> Box<dyn AsyncModule> {
            Box::new(Self {
                id,
                fail_init: false,
            })
        }
    }

    #[async_trait]
    impl AsyncModule for Recorder {
        fn id(&self) -> ModuleId {
            self.id
        }

        async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if self.fail_init {
                return Err("no device".into());
            }
            Ok(())
        }

        async fn run(
            &mut self,
            mut rx: mpsc::Receiver<ModuleEvent>,
            tx: mpsc::Sender<ModuleMessage>,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            while let Some(event) = rx.recv().await {
                match event {
                    ModuleEvent::Shutdown => break,
                    ModuleEvent::Command(command) => {
                        let line = format!("{:?} {:?}", self.id, command);
                        let _ = tx.send(ModuleMessage::Status(line)).await;
                    }
                    _ => {}
                }
            }
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }

        fn status(&self) -> HashMap<String, String> {
            HashMap::new()
        }
    }

    async fn collect(mut rx: mpsc::Receiver<ModuleMessage>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(message) = rx.recv().await {
            if let ModuleMessage::Status(line) = message {
                lines.push(line);
            }
        }
        lines.sort();
        lines
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_owner() {
        let mut manager = ModuleManager::new();
        manager.register(Recorder::boxed(ModuleId::Rhythm));
        manager.register(Recorder::boxed(ModuleId::Synth));
        let rx = manager.start().await.unwrap();

        manager.dispatch(EngineCommand::StartClock).await.unwrap();
        manager.dispatch(EngineCommand::StopAll).await.unwrap();
        manager.dispatch(EngineCommand::Shutdown).await.unwrap();
        manager.shutdown().await;

        assert_eq!(
            collect(rx).await,
            vec![
                "Rhythm Shutdown".to_string(),
                "Rhythm StartClock".to_string(),
                "Synth Shutdown".to_string(),
                "Synth StopAll".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatch_without_owner_fails() {
        let mut manager = ModuleManager::new();
        manager.register(Recorder::boxed(ModuleId::Rhythm));
        let _rx = manager.start().await.unwrap();

        assert!(manager.sender(ModuleId::Synth).is_none());
        assert!(matches!(
            manager.dispatch(EngineCommand::StopAll).await,
            Err(EngineError::ChannelClosed(_))
        ));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_twice_and_shutdown_twice() {
        let mut manager = ModuleManager::new();
        manager.register(Recorder::boxed(ModuleId::Rhythm));
        let _rx = manager.start().await.unwrap();

        assert!(matches!(manager.start().await, Err(EngineError::Module(_))));

        manager.shutdown().await;
        manager.shutdown().await;
        assert!(matches!(
            manager.dispatch(EngineCommand::StartClock).await,
            Err(EngineError::ChannelClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_failure_is_reported() {
        let mut manager = ModuleManager::new();
        manager.register(Box::new(Recorder {
            id: ModuleId::Synth,
            fail_init: true,
        }));

        match manager.start().await {
            Err(EngineError::Module(message)) => assert!(message.contains("no device")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
