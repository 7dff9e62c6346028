//! Core types for speech generation

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sample format a generator produces. Declared once per engine; the
/// playback layer performs no resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }
}

/// A fully materialized synthesis result.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub format: AudioFormat,
}

impl AudioBuffer {
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() as u64 / self.format.channels.max(1) as u64;
        Duration::from_secs_f64(frames as f64 / self.format.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Voice gender tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    Male,
    Female,
    Neutral,
}

/// Immutable voice catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    /// Unique voice identifier
    pub id: String,
    /// Human-readable voice name
    pub name: String,
    pub gender: VoiceGender,
    /// Accent tag, e.g. "american" or "british"
    pub accent: String,
}

impl Voice {
    fn entry(id: &str, name: &str, gender: VoiceGender, accent: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            gender,
            accent: accent.to_string(),
        }
    }

    /// The static Kokoro voice catalog.
    pub fn catalog() -> Vec<Voice> {
        use VoiceGender::{Female, Male};
        vec![
            Self::entry("af_heart", "Heart", Female, "american"),
            Self::entry("af_bella", "Bella", Female, "american"),
            Self::entry("af_nova", "Nova", Female, "american"),
            Self::entry("af_sky", "Sky", Female, "american"),
            Self::entry("am_adam", "Adam", Male, "american"),
            Self::entry("am_echo", "Echo", Male, "american"),
            Self::entry("am_michael", "Michael", Male, "american"),
            Self::entry("bf_alice", "Alice", Female, "british"),
            Self::entry("bf_emma", "Emma", Female, "british"),
            Self::entry("bm_daniel", "Daniel", Male, "british"),
            Self::entry("bm_george", "George", Male, "british"),
        ]
    }
}

/// Options for one synthesis call.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub voice: String,
    /// Speed multiplier applied during generation. The playback sink runs
    /// at 1.0 to avoid double time-stretching.
    pub speed: f32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            voice: "af_heart".to_string(),
            speed: 1.0,
        }
    }
}
