//! Foundation types, errors, and core configuration for Lectern

pub mod config;
pub mod error;

pub use config::{PlaybackConfig, SchedulerConfig, SpeedRange, StreamConfig};
pub use error::AudioError;

use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque session identifier. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh, monotonically increasing session id.
pub fn next_session_id() -> SessionId {
    SessionId(SESSION_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
}
