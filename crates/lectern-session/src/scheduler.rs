//! The session/chunk scheduler.
//!
//! One actor task owns all scheduling state: the active session id, the
//! prefetch window, the submit high-water mark, and the buffer of results
//! that completed out of order. Commands, generation completions, and
//! playback events all arrive through its inboxes, which makes the actor
//! the single point where a result's session id is compared against the
//! active one. Anything stale is dropped here and nowhere else.

use crate::types::{ActiveSession, ChunkSlot, ChunkState, EngineMode};
use lectern_audio::{EventBus, PlaybackEvent, PlaybackEventKind, PlaybackHandle, StreamingSource};
use lectern_foundation::{SchedulerConfig, SessionId, StreamConfig};
use lectern_tts::{normalize, split_into_chunks, SynthesisOptions, TtsEngine, TtsError, TtsResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum SchedulerCmd {
    StartSession {
        session_id: SessionId,
    },
    StreamText {
        session_id: SessionId,
        text: String,
        voice: String,
        speed: f32,
    },
    EnqueueChunk {
        session_id: SessionId,
        chunk_index: usize,
        text: String,
        voice: String,
        speed: f32,
    },
    Stop,
    SetSpeed(f32),
}

/// Completion message posted by a generation task.
#[derive(Debug)]
enum GenMsg {
    BufferDone {
        session_id: SessionId,
        chunk_index: usize,
        result: TtsResult<lectern_tts::AudioBuffer>,
    },
    StreamDone {
        session_id: SessionId,
        chunk_index: usize,
        result: TtsResult<()>,
    },
}

/// Cloneable handle for submitting scheduler commands. All calls are
/// fire-and-forget; failures surface on the event channel.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCmd>,
}

impl SchedulerHandle {
    pub fn start_session(&self, session_id: SessionId) {
        let _ = self.tx.send(SchedulerCmd::StartSession { session_id });
    }

    pub fn stream_text(&self, session_id: SessionId, text: String, voice: String, speed: f32) {
        let _ = self.tx.send(SchedulerCmd::StreamText {
            session_id,
            text,
            voice,
            speed,
        });
    }

    pub fn enqueue_chunk(
        &self,
        session_id: SessionId,
        chunk_index: usize,
        text: String,
        voice: String,
        speed: f32,
    ) {
        let _ = self.tx.send(SchedulerCmd::EnqueueChunk {
            session_id,
            chunk_index,
            text,
            voice,
            speed,
        });
    }

    pub fn stop(&self) {
        let _ = self.tx.send(SchedulerCmd::Stop);
    }

    /// Change the speed of the active session's subsequent generation
    /// calls. Session-scoped: with no active session this is a no-op,
    /// since every text command carries its own speed.
    pub fn set_speed(&self, speed: f32) {
        let _ = self.tx.send(SchedulerCmd::SetSpeed(speed));
    }
}

pub struct Scheduler {
    engine: Arc<dyn TtsEngine>,
    playback: PlaybackHandle,
    events: EventBus,
    config: SchedulerConfig,
    stream_config: StreamConfig,
    cmd_rx: mpsc::UnboundedReceiver<SchedulerCmd>,
    gen_tx: mpsc::Sender<GenMsg>,
    gen_rx: mpsc::Receiver<GenMsg>,
    playback_rx: broadcast::Receiver<PlaybackEvent>,
    session: Option<ActiveSession>,
}

impl Scheduler {
    /// Spawn the scheduler actor. It subscribes to the playback event bus
    /// to advance the prefetch window and to sequence streamed chunks.
    pub fn spawn(
        engine: Arc<dyn TtsEngine>,
        playback: PlaybackHandle,
        events: EventBus,
        config: SchedulerConfig,
        stream_config: StreamConfig,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (gen_tx, gen_rx) = mpsc::channel(64);
        let playback_rx = events.subscribe();

        let scheduler = Scheduler {
            engine,
            playback,
            events,
            config,
            stream_config,
            cmd_rx,
            gen_tx,
            gen_rx,
            playback_rx,
            session: None,
        };
        let join = tokio::spawn(scheduler.run());
        (SchedulerHandle { tx: cmd_tx }, join)
    }

    async fn run(mut self) {
        info!(target: "session", engine = self.engine.name(), "scheduler started");
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd);
                }
                Some(msg) = self.gen_rx.recv() => {
                    self.handle_generation(msg);
                }
                ev = self.playback_rx.recv() => {
                    match ev {
                        Ok(ev) => self.handle_playback_event(ev),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(target: "session", missed, "scheduler lagged on playback events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        info!(target: "session", "scheduler stopped");
    }

    fn handle_command(&mut self, cmd: SchedulerCmd) {
        match cmd {
            SchedulerCmd::StartSession { session_id } => {
                debug!(target: "session", session = %session_id, "starting session");
                let window_limit = self.config.initial_prefetch.saturating_sub(1);
                self.session = Some(ActiveSession::new(session_id, window_limit));
                self.playback.start_session(session_id);
            }
            SchedulerCmd::StreamText {
                session_id,
                text,
                voice,
                speed,
            } => self.handle_stream_text(session_id, text, voice, speed),
            SchedulerCmd::EnqueueChunk {
                session_id,
                chunk_index,
                text,
                voice,
                speed,
            } => self.handle_enqueue_chunk(session_id, chunk_index, text, voice, speed),
            SchedulerCmd::Stop => {
                if let Some(session) = self.session.take() {
                    debug!(
                        target: "session",
                        session = %session.id,
                        lived = ?session.created_at.elapsed(),
                        "stop: session torn down"
                    );
                }
                // Idempotent: clearing playback with no session is a no-op.
                self.playback.stop();
            }
            SchedulerCmd::SetSpeed(speed) => {
                if let Some(session) = self.session.as_mut() {
                    // Applies to subsequent generation calls only.
                    session.speed = speed;
                }
            }
        }
    }

    fn handle_stream_text(&mut self, session_id: SessionId, text: String, voice: String, speed: f32) {
        let Some(session) = self.session.as_mut() else {
            debug!(target: "session", session = %session_id, "stream_text with no active session");
            return;
        };
        if session.id != session_id || session.failed {
            return;
        }

        // Normalized once; sub-chunked only to respect the backend's
        // per-call input budget.
        let normalized = normalize(&text);
        if normalized.is_empty() {
            return;
        }
        let pieces = split_into_chunks(&normalized, self.config.max_stream_chars);

        session.mode = Some(EngineMode::Streaming);
        session.voice = voice;
        session.speed = speed;
        let base = session.chunks.len();
        for (offset, piece) in pieces.into_iter().enumerate() {
            session.chunks.insert(
                base + offset,
                ChunkSlot {
                    text: piece,
                    state: ChunkState::Pending,
                },
            );
        }

        // The backend plays one stream at a time; later chunks wait for
        // the current one's finish event.
        if session
            .chunks
            .values()
            .all(|c| matches!(c.state, ChunkState::Pending | ChunkState::Finished))
        {
            self.submit_next_stream_chunk();
        }
    }

    fn handle_enqueue_chunk(
        &mut self,
        session_id: SessionId,
        chunk_index: usize,
        text: String,
        voice: String,
        speed: f32,
    ) {
        let Some(session) = self.session.as_mut() else {
            debug!(target: "session", session = %session_id, "enqueue_chunk with no active session");
            return;
        };
        if session.id != session_id || session.failed {
            return;
        }
        let normalized = normalize(&text);
        if normalized.is_empty() {
            return;
        }

        session.mode = Some(EngineMode::Chunked);
        session.voice = voice;
        session.speed = speed;
        session.chunks.entry(chunk_index).or_insert(ChunkSlot {
            text: normalized,
            state: ChunkState::Pending,
        });
        self.pump_chunked_generation();
    }

    /// Submit every pending chunk the prefetch window admits, in index
    /// order. The high-water mark makes resubmission impossible.
    fn pump_chunked_generation(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.failed || session.mode != Some(EngineMode::Chunked) {
            return;
        }

        let mut to_submit = Vec::new();
        for (&index, slot) in session.chunks.iter() {
            if index > session.window_limit {
                break;
            }
            if slot.state == ChunkState::Pending {
                to_submit.push((index, slot.text.clone()));
            }
        }

        let session_id = session.id;
        let opts = SynthesisOptions {
            voice: session.voice.clone(),
            speed: session.speed,
        };
        for (index, _) in &to_submit {
            session.set_state(*index, ChunkState::Generating);
            session.submitted_high_water = Some(
                session
                    .submitted_high_water
                    .map_or(*index, |high| high.max(*index)),
            );
        }
        for (index, text) in to_submit {
            self.spawn_buffer_generation(session_id, index, text, opts.clone());
        }
    }

    fn spawn_buffer_generation(
        &self,
        session_id: SessionId,
        chunk_index: usize,
        text: String,
        opts: SynthesisOptions,
    ) {
        debug!(
            target: "session",
            session = %session_id,
            chunk = chunk_index,
            chars = text.len(),
            "submitting chunk generation"
        );
        let engine = Arc::clone(&self.engine);
        let gen_tx = self.gen_tx.clone();
        let deadline = self.config.generation_timeout;
        tokio::spawn(async move {
            let result = run_with_deadline(deadline, engine.synthesize(&text, &opts)).await;
            let _ = gen_tx
                .send(GenMsg::BufferDone {
                    session_id,
                    chunk_index,
                    result,
                })
                .await;
        });
    }

    /// Start generation for the lowest pending streamed chunk, attaching
    /// its live source to the sink before any frames exist so playback
    /// starts with the first block.
    fn submit_next_stream_chunk(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.failed {
            return;
        }
        let Some((&index, slot)) = session
            .chunks
            .iter()
            .find(|(_, slot)| slot.state == ChunkState::Pending)
        else {
            return;
        };
        let text = slot.text.clone();
        session.set_state(index, ChunkState::Generating);
        session.submitted_high_water = Some(
            session
                .submitted_high_water
                .map_or(index, |high| high.max(index)),
        );

        let (frames, source) =
            StreamingSource::channel(&self.stream_config, self.engine.output_format());
        let session_id = session.id;
        self.playback.enqueue_stream(session_id, index, source);

        let opts = SynthesisOptions {
            voice: session.voice.clone(),
            speed: session.speed,
        };
        debug!(
            target: "session",
            session = %session_id,
            chunk = index,
            chars = text.len(),
            "submitting streamed chunk"
        );
        let engine = Arc::clone(&self.engine);
        let gen_tx = self.gen_tx.clone();
        let deadline = self.config.generation_timeout;
        tokio::spawn(async move {
            let result =
                run_with_deadline(deadline, engine.synthesize_streaming(&text, &opts, frames))
                    .await;
            let _ = gen_tx
                .send(GenMsg::StreamDone {
                    session_id,
                    chunk_index: index,
                    result,
                })
                .await;
        });
    }

    fn handle_generation(&mut self, msg: GenMsg) {
        match msg {
            GenMsg::BufferDone {
                session_id,
                chunk_index,
                result,
            } => {
                if !self.is_active(session_id) {
                    debug!(
                        target: "session",
                        session = %session_id,
                        chunk = chunk_index,
                        "discarding generation result for superseded session"
                    );
                    return;
                }
                match result {
                    Ok(buffer) => {
                        if let Some(session) = self.session.as_mut() {
                            session.set_state(chunk_index, ChunkState::Ready);
                            session.ready.insert(chunk_index, buffer);
                        }
                        self.events
                            .emit_kind(session_id, chunk_index, PlaybackEventKind::ChunkReady);
                        self.flush_ready();
                    }
                    Err(e) => self.fail_chunk(session_id, chunk_index, e),
                }
            }
            GenMsg::StreamDone {
                session_id,
                chunk_index,
                result,
            } => {
                if !self.is_active(session_id) {
                    debug!(
                        target: "session",
                        session = %session_id,
                        chunk = chunk_index,
                        "discarding stream completion for superseded session"
                    );
                    return;
                }
                match result {
                    // The source observes the closed queue and ends on its
                    // own; the finish event drives the next chunk.
                    Ok(()) => {}
                    Err(e) => self.fail_chunk(session_id, chunk_index, e),
                }
            }
        }
    }

    /// Enqueue completed chunks to the sink in strict index order.
    fn flush_ready(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        while let Some(buffer) = session.ready.remove(&session.next_submit) {
            let index = session.next_submit;
            self.playback.enqueue_buffer(session.id, index, buffer);
            session.next_submit += 1;
        }
    }

    fn fail_chunk(&mut self, session_id: SessionId, chunk_index: usize, error: TtsError) {
        warn!(
            target: "session",
            session = %session_id,
            chunk = chunk_index,
            error = %error,
            "generation failed"
        );
        self.events.emit_error(
            session_id,
            chunk_index,
            PlaybackEventKind::GenerationError,
            error.to_string(),
        );
        if let Some(session) = self.session.as_mut() {
            session.set_state(chunk_index, ChunkState::Failed);
            // No auto-retry: nothing further is generated or enqueued for
            // this session; queued audio drains and in-flight results are
            // dropped on arrival.
            session.failed = true;
            session.ready.clear();
        }
    }

    fn handle_playback_event(&mut self, ev: PlaybackEvent) {
        // Stale-session guard: the one comparison point.
        if !self.is_active(ev.session_id) {
            return;
        }
        let mode = {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            match ev.event {
                PlaybackEventKind::ChunkStarted => {
                    session.set_state(ev.chunk_index, ChunkState::Playing);
                    if session.mode == Some(EngineMode::Chunked) {
                        let admit = ev.chunk_index + self.config.started_lookahead;
                        session.window_limit = session.window_limit.max(admit);
                    }
                }
                PlaybackEventKind::ChunkFinished => {
                    session.set_state(ev.chunk_index, ChunkState::Finished);
                    if session.mode == Some(EngineMode::Chunked) {
                        let admit = ev.chunk_index + self.config.finished_lookahead;
                        session.window_limit = session.window_limit.max(admit);
                    }
                }
                _ => return,
            }
            session.mode
        };

        match (ev.event, mode) {
            (PlaybackEventKind::ChunkStarted, Some(EngineMode::Chunked))
            | (PlaybackEventKind::ChunkFinished, Some(EngineMode::Chunked)) => {
                self.pump_chunked_generation();
            }
            (PlaybackEventKind::ChunkFinished, Some(EngineMode::Streaming)) => {
                self.submit_next_stream_chunk();
            }
            _ => {}
        }
    }

    fn is_active(&self, session_id: SessionId) -> bool {
        self.session
            .as_ref()
            .map(|s| s.id == session_id && !s.failed)
            .unwrap_or(false)
    }
}

async fn run_with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl std::future::Future<Output = TtsResult<T>>,
) -> TtsResult<T> {
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(TtsError::GenerationError(format!(
                "generation exceeded {:?} deadline",
                limit
            ))),
        },
        None => fut.await,
    }
}
