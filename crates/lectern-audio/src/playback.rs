//! Playback queue and transport controls.
//!
//! A dedicated `audio-playback` thread exclusively owns the output sink;
//! every mutation arrives as a command over one channel, so enqueue order
//! is playback order by construction. The worker polls the sink between
//! commands to detect chunk transitions and emits lifecycle events.

use crate::events::{EventBus, PlaybackEvent, PlaybackEventKind};
use crate::sink::{AudioSink, SinkBackend, SinkFactory};
use crate::streaming_source::StreamingSource;
use lectern_foundation::{AudioError, PlaybackConfig, SessionId};
use lectern_tts::AudioBuffer;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug)]
enum PlaybackCmd {
    StartSession(SessionId),
    EnqueueBuffer {
        session_id: SessionId,
        chunk_index: usize,
        buffer: AudioBuffer,
    },
    EnqueueStream {
        session_id: SessionId,
        chunk_index: usize,
        source: StreamingSource,
    },
    Stop,
    Pause,
    Resume,
    Shutdown,
}

/// Point-in-time playback state, updated by the worker.
#[derive(Debug, Default)]
pub struct PlaybackStatus {
    pub is_playing: AtomicBool,
    pub is_paused: AtomicBool,
    /// Chunks currently queued in the sink, including the playing one
    pub queued_chunks: AtomicUsize,
    /// Index of the chunk currently playing
    pub current_chunk: AtomicUsize,
}

/// Cloneable handle for submitting playback commands.
#[derive(Clone)]
pub struct PlaybackHandle {
    tx: Sender<PlaybackCmd>,
    status: Arc<PlaybackStatus>,
}

impl PlaybackHandle {
    pub fn start_session(&self, session_id: SessionId) {
        let _ = self.tx.send(PlaybackCmd::StartSession(session_id));
    }

    pub fn enqueue_buffer(&self, session_id: SessionId, chunk_index: usize, buffer: AudioBuffer) {
        let _ = self.tx.send(PlaybackCmd::EnqueueBuffer {
            session_id,
            chunk_index,
            buffer,
        });
    }

    pub fn enqueue_stream(
        &self,
        session_id: SessionId,
        chunk_index: usize,
        source: StreamingSource,
    ) {
        let _ = self.tx.send(PlaybackCmd::EnqueueStream {
            session_id,
            chunk_index,
            source,
        });
    }

    pub fn stop(&self) {
        let _ = self.tx.send(PlaybackCmd::Stop);
    }

    pub fn pause(&self) {
        let _ = self.tx.send(PlaybackCmd::Pause);
    }

    pub fn resume(&self) {
        let _ = self.tx.send(PlaybackCmd::Resume);
    }

    pub fn is_playing(&self) -> bool {
        self.status.is_playing.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.status.is_paused.load(Ordering::SeqCst)
    }

    pub fn queued_chunks(&self) -> usize {
        self.status.queued_chunks.load(Ordering::SeqCst)
    }

    pub fn current_chunk(&self) -> usize {
        self.status.current_chunk.load(Ordering::SeqCst)
    }
}

/// Owns the audio thread. One per process; sessions share it.
pub struct PlaybackManager {
    handle: PlaybackHandle,
    join: Option<JoinHandle<()>>,
}

impl PlaybackManager {
    /// Spawn the playback thread on the given backend. The device is opened
    /// on the audio thread itself; an open failure is reported as an
    /// `Error` event and the thread exits.
    pub fn spawn<B: SinkBackend>(backend: B, config: PlaybackConfig, events: EventBus) -> Self {
        let (tx, rx) = mpsc::channel();
        let status = Arc::new(PlaybackStatus::default());
        let worker_status = Arc::clone(&status);
        let worker_events = events.clone();

        let join = thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                let factory = match backend.open() {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::error!(target: "audio", "failed to open audio output: {}", e);
                        worker_events.emit(PlaybackEvent {
                            session_id: SessionId(0),
                            chunk_index: 0,
                            event: PlaybackEventKind::Error,
                            message: Some(format!("Failed to open audio output: {}", e)),
                        });
                        return;
                    }
                };
                PlaybackWorker {
                    factory,
                    rx,
                    events: worker_events,
                    status: worker_status,
                    config,
                    session: None,
                }
                .run();
            })
            .expect("failed to spawn audio-playback thread");

        Self {
            handle: PlaybackHandle { tx, status },
            join: Some(join),
        }
    }

    pub fn handle(&self) -> PlaybackHandle {
        self.handle.clone()
    }

    /// Stop the worker and wait for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.handle.tx.send(PlaybackCmd::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

struct SessionPlayback {
    id: SessionId,
    sink: Box<dyn AudioSink>,
    /// Chunk indices in sink order; front is the playing chunk.
    queue: VecDeque<usize>,
    /// Whether ChunkStarted was emitted for the current front.
    started_emitted: bool,
    last_len: usize,
}

struct PlaybackWorker<F: SinkFactory> {
    factory: F,
    rx: Receiver<PlaybackCmd>,
    events: EventBus,
    status: Arc<PlaybackStatus>,
    config: PlaybackConfig,
    session: Option<SessionPlayback>,
}

impl<F: SinkFactory> PlaybackWorker<F> {
    fn run(mut self) {
        tracing::debug!(target: "audio", "playback worker started");
        loop {
            match self.rx.recv_timeout(self.config.poll_interval) {
                Ok(PlaybackCmd::Shutdown) => break,
                Ok(cmd) => self.handle_command(cmd),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.poll_session();
        }
        if let Some(mut session) = self.session.take() {
            session.sink.stop();
        }
        tracing::debug!(target: "audio", "playback worker stopped");
    }

    fn handle_command(&mut self, cmd: PlaybackCmd) {
        match cmd {
            PlaybackCmd::StartSession(session_id) => self.start_session(session_id),
            PlaybackCmd::EnqueueBuffer {
                session_id,
                chunk_index,
                buffer,
            } => {
                // Settle any playout that raced this command; otherwise a
                // pop and this push cancel in the queue-length delta and
                // the finish is never observed.
                self.settle_finished();
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if session.id != session_id {
                    tracing::debug!(
                        target: "audio",
                        session = %session_id,
                        chunk = chunk_index,
                        "dropping buffer for inactive session"
                    );
                    return;
                }
                session.sink.append_buffer(buffer);
                session.queue.push_back(chunk_index);
                session.last_len = session.sink.queued();
                let queued = session.last_len;
                self.after_append(session_id, chunk_index, queued);
            }
            PlaybackCmd::EnqueueStream {
                session_id,
                chunk_index,
                source,
            } => {
                self.settle_finished();
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if session.id != session_id {
                    tracing::debug!(
                        target: "audio",
                        session = %session_id,
                        chunk = chunk_index,
                        "dropping stream for inactive session"
                    );
                    return;
                }
                session.sink.append_stream(source);
                session.queue.push_back(chunk_index);
                session.last_len = session.sink.queued();
                let queued = session.last_len;
                self.after_append(session_id, chunk_index, queued);
            }
            PlaybackCmd::Stop => {
                if let Some(mut session) = self.session.take() {
                    tracing::debug!(target: "audio", session = %session.id, "stopping playback");
                    session.sink.stop();
                }
                self.reset_status();
            }
            PlaybackCmd::Pause => {
                if let Some(session) = self.session.as_mut() {
                    session.sink.pause();
                    self.status.is_paused.store(true, Ordering::SeqCst);
                }
            }
            PlaybackCmd::Resume => {
                if let Some(session) = self.session.as_mut() {
                    session.sink.resume();
                    self.status.is_paused.store(false, Ordering::SeqCst);
                }
            }
            PlaybackCmd::Shutdown => unreachable!("handled in run"),
        }
    }

    fn start_session(&mut self, session_id: SessionId) {
        if let Some(mut old) = self.session.take() {
            old.sink.stop();
        }
        self.reset_status();

        match self.factory.new_sink() {
            Ok(sink) => {
                tracing::debug!(target: "audio", session = %session_id, "session sink created");
                self.session = Some(SessionPlayback {
                    id: session_id,
                    sink,
                    queue: VecDeque::new(),
                    started_emitted: false,
                    last_len: 0,
                });
            }
            Err(e) => {
                tracing::error!(target: "audio", "failed to create audio sink: {}", e);
                self.events.emit(PlaybackEvent {
                    session_id,
                    chunk_index: 0,
                    event: PlaybackEventKind::Error,
                    message: Some(format!("Failed to create audio sink: {}", e)),
                });
            }
        }
    }

    fn after_append(&self, session_id: SessionId, chunk_index: usize, queued: usize) {
        self.events
            .emit_kind(session_id, chunk_index, PlaybackEventKind::ChunkQueued);
        self.status.queued_chunks.store(queued, Ordering::SeqCst);
    }

    /// Emit Finished for every chunk the sink played out since the last
    /// observation and snapshot the queue length. Must run before anything
    /// is appended, so a pop and a push can never cancel in the delta.
    fn settle_finished(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.sink.poll();
        let len = session.sink.queued();

        let finished = session.last_len.saturating_sub(len);
        for _ in 0..finished {
            if let Some(done) = session.queue.pop_front() {
                self.events
                    .emit_kind(session.id, done, PlaybackEventKind::ChunkFinished);
            }
            session.started_emitted = false;
        }
        session.last_len = len;
    }

    /// Observe sink progress: settle finishes, emit Started for the chunk
    /// now at the front, and keep the status atomics current.
    fn poll_session(&mut self) {
        self.settle_finished();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let len = session.last_len;

        let paused = self.status.is_paused.load(Ordering::SeqCst);
        if let Some(&front) = session.queue.front() {
            if !session.started_emitted && !paused {
                self.events
                    .emit_kind(session.id, front, PlaybackEventKind::ChunkStarted);
                session.started_emitted = true;
                self.status.current_chunk.store(front, Ordering::SeqCst);
            }
        }

        self.status.queued_chunks.store(len, Ordering::SeqCst);
        self.status
            .is_playing
            .store(len > 0 && !paused, Ordering::SeqCst);
    }

    fn reset_status(&self) {
        self.status.is_playing.store(false, Ordering::SeqCst);
        self.status.is_paused.store(false, Ordering::SeqCst);
        self.status.queued_chunks.store(0, Ordering::SeqCst);
        self.status.current_chunk.store(0, Ordering::SeqCst);
    }
}
