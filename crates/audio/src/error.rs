use cadence_core::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("No audio output device available")]
    NoOutputDevice,

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<SynthError> for EngineError {
    fn from(err: SynthError) -> Self {
        match err {
            SynthError::Engine(inner) => inner,
            other => EngineError::AudioResourceUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_errors_become_unavailable() {
        let err: EngineError = SynthError::NoOutputDevice.into();
        assert_eq!(
            err,
            EngineError::AudioResourceUnavailable("No audio output device available".to_string())
        );

        let err: EngineError = SynthError::Engine(EngineError::UnknownNote("H".to_string())).into();
        assert_eq!(err, EngineError::UnknownNote("H".to_string()));
    }
}
