//! Lectern application layer: the `SpeechService` facade a presentation
//! layer talks to, wired over the session scheduler and playback manager.

pub mod service;

pub use service::{ServiceConfig, SpeechService};
