//! Text-to-speech generator abstraction layer for Lectern
//!
//! This crate defines the contract between the playback pipeline and any
//! TTS backend: the `TtsEngine` trait with a batch path (one buffer per
//! call) and a streaming path (sample blocks pushed through a `FrameSink`
//! while the caller already plays them), plus voice/format types and the
//! text normalization and chunking used by both engine modes.

pub mod engine;
pub mod error;
pub mod frame;
pub mod sine;
pub mod text;
pub mod types;

pub use engine::TtsEngine;
pub use error::{TtsError, TtsResult};
pub use frame::{FrameSink, StreamAbandoned};
pub use sine::{SineConfig, SineEngine};
pub use text::{normalize, split_into_chunks};
pub use types::{AudioBuffer, AudioFormat, SynthesisOptions, Voice, VoiceGender};
