//! Pipeline configuration
//!
//! Every tuning constant in the playback pipeline lives here with its
//! production default. The prefetch increments and the streaming input
//! budget are empirically tuned values, kept as plain fields rather than
//! derived formulas.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Allowed range for the playback speed multiplier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpeedRange {
    pub min: f32,
    pub max: f32,
}

impl Default for SpeedRange {
    fn default() -> Self {
        Self { min: 0.5, max: 2.0 }
    }
}

impl SpeedRange {
    pub fn contains(&self, speed: f32) -> bool {
        speed.is_finite() && speed >= self.min && speed <= self.max
    }

    pub fn clamp(&self, speed: f32) -> f32 {
        speed.clamp(self.min, self.max)
    }
}

/// Configuration of the bounded queue between a streaming producer and the
/// audio thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Capacity of the sample-block queue.
    pub queue_capacity: usize,
    /// How long a pull waits for the next block before yielding silence.
    pub pull_timeout: Duration,
    /// How long a push waits before retrying under backpressure.
    pub push_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            pull_timeout: Duration::from_millis(50),
            push_timeout: Duration::from_millis(200),
        }
    }
}

/// Configuration of the playback worker thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Command-poll interval of the audio thread; also bounds how quickly
    /// chunk transitions are observed.
    pub poll_interval: Duration,
    /// Capacity of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(25),
            event_capacity: 256,
        }
    }
}

/// Configuration of the session/chunk scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Chunks submitted for generation when a chunked session starts.
    pub initial_prefetch: usize,
    /// Generation window extends through `i + started_lookahead` when
    /// chunk `i` starts playing.
    pub started_lookahead: usize,
    /// Generation window extends through `i + finished_lookahead` when
    /// chunk `i` finishes playing.
    pub finished_lookahead: usize,
    /// Maximum characters per streaming generation call; longer text is
    /// split into sequential streamed chunks.
    pub max_stream_chars: usize,
    /// Allowed speed multiplier range.
    pub speed: SpeedRange,
    /// Force-fail a generation call that runs longer than this. `None`
    /// waits indefinitely.
    pub generation_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_prefetch: 5,
            started_lookahead: 7,
            finished_lookahead: 8,
            max_stream_chars: 800,
            speed: SpeedRange::default(),
            generation_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_range_bounds() {
        let range = SpeedRange::default();
        assert!(range.contains(1.0));
        assert!(range.contains(0.5));
        assert!(range.contains(2.0));
        assert!(!range.contains(0.4));
        assert!(!range.contains(2.5));
        assert!(!range.contains(f32::NAN));
        assert_eq!(range.clamp(3.0), 2.0);
    }

    #[test]
    fn defaults_match_tuned_values() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.initial_prefetch, 5);
        assert_eq!(cfg.started_lookahead, 7);
        assert_eq!(cfg.finished_lookahead, 8);
        assert_eq!(cfg.max_stream_chars, 800);
        assert!(cfg.generation_timeout.is_none());
    }
}
