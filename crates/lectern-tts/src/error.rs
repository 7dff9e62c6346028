//! Error types for speech generation

use thiserror::Error;

/// TTS error types
#[derive(Error, Debug)]
pub enum TtsError {
    /// Requested voice is not in the engine catalog
    #[error("Unknown voice: {0}")]
    InvalidVoice(String),

    /// A synthesis parameter is outside its allowed range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Model or device is not initialized
    #[error("TTS backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Inference failed, mid-batch or mid-stream
    #[error("Generation failed: {0}")]
    GenerationError(String),

    /// Invalid text input
    #[error("Invalid text input: {0}")]
    InvalidInput(String),
}

/// Result type for TTS operations
pub type TtsResult<T> = Result<T, TtsError>;
