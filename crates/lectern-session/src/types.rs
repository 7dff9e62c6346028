//! Session and chunk state

use lectern_foundation::SessionId;
use lectern_tts::AudioBuffer;
use std::collections::BTreeMap;
use std::time::Instant;

/// Which generator path a session uses. Chunked engines return one buffer
/// per call and overlap calls through prefetching; streaming engines yield
/// frames while generating, one stream at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Chunked,
    Streaming,
}

/// Generation/playback status of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Generating,
    Ready,
    Playing,
    Finished,
    Failed,
}

#[derive(Debug)]
pub(crate) struct ChunkSlot {
    pub text: String,
    pub state: ChunkState,
}

/// State of the one active session. Superseded sessions are simply
/// replaced; their in-flight results fail the id comparison and are
/// dropped.
pub(crate) struct ActiveSession {
    pub id: SessionId,
    pub mode: Option<EngineMode>,
    pub voice: String,
    pub speed: f32,
    pub created_at: Instant,
    /// Registered chunks by index.
    pub chunks: BTreeMap<usize, ChunkSlot>,
    /// Highest chunk index ever submitted for generation; nothing is
    /// submitted twice.
    pub submitted_high_water: Option<usize>,
    /// Highest chunk index the prefetch window currently admits.
    pub window_limit: usize,
    /// Completed out of order, waiting for lower indices before they can
    /// be enqueued.
    pub ready: BTreeMap<usize, AudioBuffer>,
    /// Next index to hand to the playback manager (chunked mode).
    pub next_submit: usize,
    /// A generation failure ended this session; drop everything further.
    pub failed: bool,
}

impl ActiveSession {
    pub fn new(id: SessionId, window_limit: usize) -> Self {
        Self {
            id,
            mode: None,
            voice: String::new(),
            speed: 1.0,
            created_at: Instant::now(),
            chunks: BTreeMap::new(),
            submitted_high_water: None,
            window_limit,
            ready: BTreeMap::new(),
            next_submit: 0,
            failed: false,
        }
    }

    pub fn set_state(&mut self, index: usize, state: ChunkState) {
        if let Some(slot) = self.chunks.get_mut(&index) {
            slot.state = state;
        }
    }

    pub fn state(&self, index: usize) -> Option<ChunkState> {
        self.chunks.get(&index).map(|s| s.state)
    }
}
