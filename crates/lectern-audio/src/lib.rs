//! Audio playback for Lectern: a single-owner sink behind a command
//! channel, a channel-backed streaming source with silence fallback, and
//! the lifecycle event bus the UI layer consumes.

pub mod events;
pub mod playback;
pub mod sink;
pub mod streaming_source;

pub use events::{EventBus, PlaybackEvent, PlaybackEventKind};
pub use playback::{PlaybackHandle, PlaybackManager, PlaybackStatus};
pub use sink::{
    AppendLog, AppendRecord, AudioSink, RodioBackend, SimulatedBackend, SinkBackend, SinkFactory,
};
pub use streaming_source::StreamingSource;
