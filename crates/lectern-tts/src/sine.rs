//! Deterministic tone-generator engine.
//!
//! Stands in for a neural backend during development and drives the test
//! suite: output length is a pure function of text length and speed, blocks
//! stream at a configurable pace, and failures can be injected at a given
//! block.

use crate::engine::TtsEngine;
use crate::error::{TtsError, TtsResult};
use crate::frame::FrameSink;
use crate::types::{AudioBuffer, AudioFormat, SynthesisOptions, Voice};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SineConfig {
    pub format: AudioFormat,
    /// Text-length-to-duration mapping: characters spoken per second at 1.0x.
    pub chars_per_second: f32,
    /// Samples per streamed block.
    pub block_size: usize,
    /// Simulated inference latency per streamed block.
    pub block_delay: Duration,
    /// Fail streaming synthesis after this many blocks.
    pub fail_after_blocks: Option<usize>,
}

impl Default for SineConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::mono(24_000),
            chars_per_second: 15.0,
            block_size: 2_400,
            block_delay: Duration::ZERO,
            fail_after_blocks: None,
        }
    }
}

pub struct SineEngine {
    config: SineConfig,
    ready: bool,
}

impl SineEngine {
    pub fn new(config: SineConfig) -> Self {
        Self {
            config,
            ready: true,
        }
    }

    /// An engine whose backend never comes up; every call reports
    /// `BackendUnavailable`.
    pub fn unavailable() -> Self {
        Self {
            config: SineConfig::default(),
            ready: false,
        }
    }

    fn check_input(&self, text: &str, options: &SynthesisOptions) -> TtsResult<()> {
        if !self.ready {
            return Err(TtsError::BackendUnavailable(
                "sine engine not initialized".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(TtsError::InvalidInput("text is empty".to_string()));
        }
        self.resolve_voice(&options.voice)?;
        if !(options.speed.is_finite() && options.speed > 0.0) {
            return Err(TtsError::InvalidParameter(format!(
                "speed must be positive, got {}",
                options.speed
            )));
        }
        Ok(())
    }

    fn sample_count(&self, text: &str, speed: f32) -> usize {
        let duration = (text.len() as f32 / self.config.chars_per_second) / speed;
        (duration * self.config.format.sample_rate as f32) as usize
    }

    /// Enveloped 440 Hz tone; attack and release avoid clicks at chunk
    /// boundaries.
    fn tone(&self, num_samples: usize) -> Vec<f32> {
        let rate = self.config.format.sample_rate as f32;
        let duration = num_samples as f32 / rate;
        let frequency = 440.0;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / rate;
                let envelope = if t < 0.1 {
                    t / 0.1
                } else if t > duration - 0.1 {
                    ((duration - t) / 0.1).max(0.0)
                } else {
                    1.0
                };
                (t * frequency * 2.0 * std::f32::consts::PI).sin() * 0.3 * envelope
            })
            .collect()
    }
}

#[async_trait]
impl TtsEngine for SineEngine {
    fn name(&self) -> &str {
        "sine"
    }

    fn output_format(&self) -> AudioFormat {
        self.config.format
    }

    fn voices(&self) -> Vec<Voice> {
        Voice::catalog()
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn is_ready(&self) -> bool {
        self.ready
    }

    async fn synthesize(&self, text: &str, options: &SynthesisOptions) -> TtsResult<AudioBuffer> {
        self.check_input(text, options)?;
        let samples = self.tone(self.sample_count(text, options.speed));
        tracing::debug!(
            target: "tts",
            chars = text.len(),
            samples = samples.len(),
            "sine batch synthesis"
        );
        Ok(AudioBuffer {
            samples,
            format: self.config.format,
        })
    }

    async fn synthesize_streaming(
        &self,
        text: &str,
        options: &SynthesisOptions,
        frames: FrameSink,
    ) -> TtsResult<()> {
        self.check_input(text, options)?;
        let samples = self.tone(self.sample_count(text, options.speed));
        let mut pushed_blocks = 0usize;

        for block in samples.chunks(self.config.block_size.max(1)) {
            if let Some(limit) = self.config.fail_after_blocks {
                if pushed_blocks >= limit {
                    return Err(TtsError::GenerationError(
                        "injected mid-stream failure".to_string(),
                    ));
                }
            }
            if !self.config.block_delay.is_zero() {
                tokio::time::sleep(self.config.block_delay).await;
            }
            if frames.push(block.to_vec()).is_err() {
                tracing::debug!(target: "tts", "consumer gone, stopping sine stream");
                return Ok(());
            }
            pushed_blocks += 1;
        }

        tracing::debug!(target: "tts", blocks = pushed_blocks, "sine stream complete");
        Ok(())
    }
}
