//! Playback lifecycle event channel.
//!
//! One-directional notifications from the backend to whatever presentation
//! layer is listening (highlighting, transport controls). Emission never
//! blocks; a subscriber that lags past the channel capacity loses the
//! oldest events first.

use lectern_foundation::SessionId;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEventKind {
    /// Generation for a chunk completed; audio is materialized
    ChunkReady,
    /// Chunk appended to the audio sink
    ChunkQueued,
    /// Chunk began playing
    ChunkStarted,
    /// Chunk finished playing
    ChunkFinished,
    /// Generation failed for a chunk
    GenerationError,
    /// Audio device or sink failure
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackEvent {
    pub session_id: SessionId,
    pub chunk_index: usize,
    pub event: PlaybackEventKind,
    pub message: Option<String>,
}

/// Broadcast fan-out for playback events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlaybackEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: PlaybackEvent) {
        tracing::trace!(
            target: "audio",
            session = %event.session_id,
            chunk = event.chunk_index,
            kind = ?event.event,
            "playback event"
        );
        // No subscribers is fine; events are advisory.
        let _ = self.tx.send(event);
    }

    pub fn emit_kind(&self, session_id: SessionId, chunk_index: usize, event: PlaybackEventKind) {
        self.emit(PlaybackEvent {
            session_id,
            chunk_index,
            event,
            message: None,
        });
    }

    pub fn emit_error(
        &self,
        session_id: SessionId,
        chunk_index: usize,
        event: PlaybackEventKind,
        message: String,
    ) {
        self.emit(PlaybackEvent {
            session_id,
            chunk_index,
            event,
            message: Some(message),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_all_subscribers() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit_kind(SessionId(1), 0, PlaybackEventKind::ChunkStarted);

        let ev = a.recv().await.unwrap();
        assert_eq!(ev.event, PlaybackEventKind::ChunkStarted);
        assert_eq!(ev.session_id, SessionId(1));
        assert!(b.recv().await.is_ok());
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.emit_kind(SessionId(9), 3, PlaybackEventKind::ChunkFinished);
    }
}
