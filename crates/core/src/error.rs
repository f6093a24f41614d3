//! Error types shared by the engine components.
//!
//! None of these are fatal to a running session. Callers at the engine
//! boundary turn them into a logged diagnostic plus silence (for audio) or a
//! rejected command (for configuration), never a panic.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Requested note name is not one of the twelve chromatic names.
    #[error("Unknown note name: {0:?}")]
    UnknownNote(String),

    /// The host audio subsystem could not be opened.
    ///
    /// Reported once when the engine starts. Afterwards every `play*` request
    /// is accepted and silently dropped.
    #[error("Audio output unavailable: {0}")]
    AudioResourceUnavailable(String),

    /// Beat pattern rejected at configuration time.
    #[error("Invalid beat pattern: {0}")]
    InvalidPattern(String),

    /// A time signature string that is not `N/D`.
    #[error("Invalid time signature: {0:?}")]
    InvalidTimeSignature(String),

    /// The clock was started before any pattern was configured.
    #[error("Beat clock has no pattern configured")]
    ClockNotConfigured,

    /// A tap or selection arrived after the session was frozen.
    #[error("Session already finalized")]
    SessionFinalized,

    /// A tap arrived while no round was running.
    #[error("No active round")]
    NoActiveRound,

    #[error("Configuration error: {0}")]
    Config(String),

    /// A module failed to initialize or the manager was started twice.
    #[error("Module error: {0}")]
    Module(String),

    /// The owning task of a component has gone away.
    #[error("Engine channel closed: {0}")]
    ChannelClosed(String),
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EngineError::UnknownNote("H".to_string());
        assert_eq!(err.to_string(), "Unknown note name: \"H\"");

        let err = EngineError::InvalidPattern("pattern has no beats".to_string());
        assert_eq!(err.to_string(), "Invalid beat pattern: pattern has no beats");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: EngineError = ConfigError::ParseError("bad json".to_string()).into();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(err.to_string().contains("bad json"));
    }
}
