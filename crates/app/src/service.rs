//! The speech service facade.
//!
//! One object wires the engine, scheduler, and playback manager together
//! and exposes the command surface a presentation layer calls. Commands
//! validate their inputs synchronously and return the failure to the
//! caller; everything that happens after submission (generation, device
//! trouble, lifecycle) is reported through the event channel only.

use lectern_audio::{EventBus, PlaybackEvent, PlaybackManager, SinkBackend};
use lectern_foundation::{PlaybackConfig, SchedulerConfig, SessionId, SpeedRange, StreamConfig};
use lectern_session::{Scheduler, SchedulerHandle};
use lectern_tts::{TtsEngine, TtsError, TtsResult, Voice};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub playback: PlaybackConfig,
    pub stream: StreamConfig,
    pub scheduler: SchedulerConfig,
}

pub struct SpeechService {
    engine: Arc<dyn TtsEngine>,
    scheduler: SchedulerHandle,
    playback: lectern_audio::PlaybackHandle,
    events: EventBus,
    speed_range: SpeedRange,
    manager: PlaybackManager,
}

impl SpeechService {
    /// Wire up the pipeline on the given sink backend. The backend opens
    /// on the playback thread; if the device is unavailable that surfaces
    /// as an `error` event, not a construction failure.
    pub fn spawn<B: SinkBackend>(
        engine: Arc<dyn TtsEngine>,
        backend: B,
        config: ServiceConfig,
    ) -> Self {
        let events = EventBus::new(config.playback.event_capacity);
        let manager = PlaybackManager::spawn(backend, config.playback.clone(), events.clone());
        let (scheduler, _join) = Scheduler::spawn(
            Arc::clone(&engine),
            manager.handle(),
            events.clone(),
            config.scheduler.clone(),
            config.stream.clone(),
        );
        info!(engine = engine.name(), "speech service started");
        Self {
            engine,
            scheduler,
            playback: manager.handle(),
            events,
            speed_range: config.scheduler.speed,
            manager,
        }
    }

    /// Create/reset scheduler state for this session id. Any previous
    /// session is superseded.
    pub fn start_session(&self, session_id: SessionId) {
        self.scheduler.start_session(session_id);
    }

    /// Submit unbounded text for streaming synthesis. Fire-and-forget
    /// after validation; audio arrives via the sink and events.
    pub async fn stream_text(
        &self,
        session_id: SessionId,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> TtsResult<()> {
        self.validate(voice, speed).await?;
        self.scheduler
            .stream_text(session_id, text.to_string(), voice.to_string(), speed);
        Ok(())
    }

    /// Submit one pre-split chunk for batch synthesis.
    pub async fn enqueue_chunk(
        &self,
        session_id: SessionId,
        chunk_index: usize,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> TtsResult<()> {
        self.validate(voice, speed).await?;
        self.scheduler
            .enqueue_chunk(session_id, chunk_index, text.to_string(), voice.to_string(), speed);
        Ok(())
    }

    /// Tear down the active session and halt audio. Safe to call at any
    /// time, including with nothing playing.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Transport control only; generation is unaffected.
    pub fn pause(&self) {
        self.playback.pause();
    }

    pub fn resume(&self) {
        self.playback.resume();
    }

    /// Applies to the active session's subsequent generation calls, not to
    /// in-flight audio. Session-scoped: a no-op with no active session
    /// (`stream_text`/`enqueue_chunk` carry their own speed).
    pub fn set_speed(&self, speed: f32) -> TtsResult<()> {
        self.check_speed(speed)?;
        self.scheduler.set_speed(speed);
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.playback.is_paused()
    }

    pub fn get_voices(&self) -> Vec<Voice> {
        self.engine.voices()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Stop playback and join the audio thread.
    pub fn shutdown(self) {
        self.scheduler.stop();
        drop(self.scheduler);
        self.manager.shutdown();
    }

    async fn validate(&self, voice: &str, speed: f32) -> TtsResult<()> {
        self.engine.resolve_voice(voice)?;
        self.check_speed(speed)?;
        if !self.engine.is_ready().await {
            return Err(TtsError::BackendUnavailable(format!(
                "{} backend is not initialized",
                self.engine.name()
            )));
        }
        Ok(())
    }

    fn check_speed(&self, speed: f32) -> TtsResult<()> {
        if !self.speed_range.contains(speed) {
            return Err(TtsError::InvalidParameter(format!(
                "speed {} outside allowed range {}..={}",
                speed, self.speed_range.min, self.speed_range.max
            )));
        }
        Ok(())
    }
}
