use thiserror::Error;

/// Audio device/sink failures. These surface as `error` events on the
/// playback event channel rather than as bubbled results; the manager
/// stays usable for the next session.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio output: {0}")]
    OutputStream(#[from] rodio::StreamError),

    #[error("Failed to create audio sink: {0}")]
    SinkCreation(#[from] rodio::PlayError),
}
