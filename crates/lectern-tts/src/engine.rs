//! TTS engine abstraction
//!
//! A generator either returns one complete buffer per call (chunked/batch
//! engines) or pushes sample blocks into a `FrameSink` as they are produced
//! (streaming engines). Batch calls may block their task for the whole
//! inference, so callers run them off the audio-owning context.

use crate::error::{TtsError, TtsResult};
use crate::frame::FrameSink;
use crate::types::{AudioBuffer, AudioFormat, SynthesisOptions, Voice};
use async_trait::async_trait;

/// Core TTS engine interface
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Engine name/identifier
    fn name(&self) -> &str;

    /// Native output format of this engine. Fixed for the engine lifetime.
    fn output_format(&self) -> AudioFormat;

    /// Immutable voice catalog
    fn voices(&self) -> Vec<Voice>;

    /// Whether `synthesize_streaming` is implemented
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Whether the model/device is initialized and ready for synthesis
    async fn is_ready(&self) -> bool {
        true
    }

    /// Synthesize the full text into one buffer.
    async fn synthesize(&self, text: &str, options: &SynthesisOptions) -> TtsResult<AudioBuffer>;

    /// Synthesize incrementally, pushing sample blocks into `frames` as
    /// they are produced. Returns once the stream is complete; a mid-stream
    /// inference failure is returned as `GenerationError` and the dropped
    /// sink closes the queue so the consumer reaches end-of-stream.
    async fn synthesize_streaming(
        &self,
        text: &str,
        options: &SynthesisOptions,
        frames: FrameSink,
    ) -> TtsResult<()> {
        let _ = (text, options, frames);
        Err(TtsError::GenerationError(format!(
            "{} does not support streaming synthesis",
            self.name()
        )))
    }

    /// Look up a voice id in the catalog.
    fn resolve_voice(&self, voice_id: &str) -> TtsResult<Voice> {
        self.voices()
            .into_iter()
            .find(|v| v.id == voice_id)
            .ok_or_else(|| TtsError::InvalidVoice(voice_id.to_string()))
    }
}
