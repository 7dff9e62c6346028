//! Session and chunk scheduling for Lectern
//!
//! Sits between the service facade and the playback/TTS layers: tracks
//! the single active session, submits chunk generation inside a rolling
//! prefetch window, re-orders out-of-order completions before they reach
//! the sink, and discards anything belonging to a superseded session.

pub mod scheduler;
pub mod types;

pub use scheduler::{Scheduler, SchedulerHandle};
pub use types::{ChunkState, EngineMode};
