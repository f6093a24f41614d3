pub mod module_manager;
pub mod rhythm_module;
pub mod traits;

// Re-export for convenience
pub use module_manager::ModuleManager;
pub use rhythm_module::RhythmModule;
pub use traits::{now, sleep_until_deadline, AsyncModule, ModuleEvent, ModuleId, ModuleMessage};
