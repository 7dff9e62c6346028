//! Scheduler tests against the simulated sink backend and a
//! controllable-latency engine double.

use async_trait::async_trait;
use lectern_audio::{EventBus, PlaybackEventKind, PlaybackManager, SimulatedBackend};
use lectern_foundation::{PlaybackConfig, SchedulerConfig, SessionId, StreamConfig};
use lectern_session::Scheduler;
use lectern_tts::{
    AudioBuffer, AudioFormat, SineConfig, SineEngine, SynthesisOptions, TtsEngine, TtsError,
    TtsResult, Voice,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

/// Engine double whose per-call latency is encoded in the text itself:
/// the last whitespace token is parsed as a delay in milliseconds. A text
/// containing "boom" fails generation. Calls are recorded for window
/// assertions.
struct DelayedEngine {
    format: AudioFormat,
    audio_ms: usize,
    calls: Arc<Mutex<Vec<String>>>,
}

impl DelayedEngine {
    fn new(audio_ms: usize) -> Self {
        Self {
            // 1 kHz mono keeps one sample per millisecond.
            format: AudioFormat::mono(1_000),
            audio_ms,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }
}

fn delay_of(text: &str) -> Duration {
    let ms = text
        .split_whitespace()
        .last()
        .and_then(|t| t.parse::<u64>().ok())
        .unwrap_or(5);
    Duration::from_millis(ms)
}

#[async_trait]
impl TtsEngine for DelayedEngine {
    fn name(&self) -> &str {
        "delayed"
    }

    fn output_format(&self) -> AudioFormat {
        self.format
    }

    fn voices(&self) -> Vec<Voice> {
        Voice::catalog()
    }

    async fn synthesize(&self, text: &str, _options: &SynthesisOptions) -> TtsResult<AudioBuffer> {
        self.calls.lock().unwrap().push(text.to_string());
        tokio::time::sleep(delay_of(text)).await;
        if text.contains("boom") {
            return Err(TtsError::GenerationError("inference exploded".to_string()));
        }
        Ok(AudioBuffer {
            samples: vec![0.1; self.audio_ms],
            format: self.format,
        })
    }
}

struct Harness {
    scheduler: lectern_session::SchedulerHandle,
    rx: tokio::sync::broadcast::Receiver<lectern_audio::PlaybackEvent>,
    _manager: PlaybackManager,
}

fn spawn_pipeline(engine: Arc<dyn TtsEngine>, config: SchedulerConfig) -> Harness {
    let events = EventBus::new(256);
    let rx = events.subscribe();
    let playback_config = PlaybackConfig {
        poll_interval: Duration::from_millis(5),
        event_capacity: 256,
    };
    let manager = PlaybackManager::spawn(SimulatedBackend::new(), playback_config, events.clone());
    let (scheduler, _join) = Scheduler::spawn(
        engine,
        manager.handle(),
        events,
        config,
        StreamConfig::default(),
    );
    Harness {
        scheduler,
        rx,
        _manager: manager,
    }
}

async fn next_event_of(
    rx: &mut tokio::sync::broadcast::Receiver<lectern_audio::PlaybackEvent>,
    kind: PlaybackEventKind,
) -> lectern_audio::PlaybackEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            let ev = rx.recv().await.expect("event channel closed");
            if ev.event == kind {
                return ev;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn drain_kinds(
    rx: &mut tokio::sync::broadcast::Receiver<lectern_audio::PlaybackEvent>,
) -> Vec<(PlaybackEventKind, usize, SessionId)> {
    let mut seen = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        seen.push((ev.event, ev.chunk_index, ev.session_id));
    }
    seen
}

#[tokio::test]
async fn out_of_order_completions_enqueue_in_index_order() {
    let engine = Arc::new(DelayedEngine::new(20));
    let mut h = spawn_pipeline(engine, SchedulerConfig::default());

    let session = SessionId(1);
    h.scheduler.start_session(session);
    h.scheduler
        .enqueue_chunk(session, 0, "slowest 90".into(), "af_heart".into(), 1.0);
    h.scheduler
        .enqueue_chunk(session, 1, "middling 60".into(), "af_heart".into(), 1.0);
    h.scheduler
        .enqueue_chunk(session, 2, "fastest 10".into(), "af_heart".into(), 1.0);

    let mut ready_order = Vec::new();
    let mut queued_order = Vec::new();
    while queued_order.len() < 3 {
        let ev = timeout(Duration::from_secs(2), h.rx.recv())
            .await
            .expect("timed out")
            .expect("event channel closed");
        match ev.event {
            PlaybackEventKind::ChunkReady => ready_order.push(ev.chunk_index),
            PlaybackEventKind::ChunkQueued => queued_order.push(ev.chunk_index),
            _ => {}
        }
    }

    // Generation completed out of order but the sink saw index order.
    assert_eq!(ready_order, vec![2, 1, 0]);
    assert_eq!(queued_order, vec![0, 1, 2]);

    for expected in 0..3 {
        let finished = next_event_of(&mut h.rx, PlaybackEventKind::ChunkFinished).await;
        assert_eq!(finished.chunk_index, expected);
    }
}

#[tokio::test]
async fn initial_prefetch_caps_the_first_generation_wave() {
    let engine = Arc::new(DelayedEngine::new(15));
    let calls = engine.calls();
    let config = SchedulerConfig {
        initial_prefetch: 2,
        ..SchedulerConfig::default()
    };
    let mut h = spawn_pipeline(engine, config);

    let session = SessionId(1);
    h.scheduler.start_session(session);
    for i in 0..6 {
        h.scheduler.enqueue_chunk(
            session,
            i,
            format!("chunk {i} 40"),
            "af_heart".into(),
            1.0,
        );
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.lock().unwrap().len(), 2);

    // Lifecycle events widen the window until everything plays out.
    for expected in 0..6 {
        let finished = next_event_of(&mut h.rx, PlaybackEventKind::ChunkFinished).await;
        assert_eq!(finished.chunk_index, expected);
    }
    assert_eq!(calls.lock().unwrap().len(), 6);
}

#[tokio::test]
async fn stop_discards_in_flight_generation() {
    let engine = Arc::new(DelayedEngine::new(20));
    let mut h = spawn_pipeline(engine, SchedulerConfig::default());

    let session = SessionId(1);
    h.scheduler.start_session(session);
    h.scheduler
        .enqueue_chunk(session, 0, "still cooking 80".into(), "af_heart".into(), 1.0);
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.scheduler.stop();
    // Stopping again is a no-op.
    h.scheduler.stop();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let seen = drain_kinds(&mut h.rx);
    assert!(
        !seen.iter().any(|(kind, _, _)| matches!(
            kind,
            PlaybackEventKind::ChunkQueued | PlaybackEventKind::ChunkStarted
        )),
        "stale result reached the sink: {seen:?}"
    );
}

#[tokio::test]
async fn new_session_supersedes_old() {
    let engine = Arc::new(DelayedEngine::new(15));
    let mut h = spawn_pipeline(engine, SchedulerConfig::default());

    let old = SessionId(1);
    h.scheduler.start_session(old);
    h.scheduler
        .enqueue_chunk(old, 0, "from the old book 120".into(), "af_heart".into(), 1.0);

    let new = SessionId(2);
    h.scheduler.start_session(new);
    h.scheduler
        .enqueue_chunk(new, 0, "from the new book 10".into(), "af_heart".into(), 1.0);

    let finished = next_event_of(&mut h.rx, PlaybackEventKind::ChunkFinished).await;
    assert_eq!(finished.session_id, new);

    // Give the superseded generation time to complete and be dropped.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let seen = drain_kinds(&mut h.rx);
    assert!(
        seen.iter().all(|(_, _, session)| *session == new),
        "event from superseded session leaked: {seen:?}"
    );
}

#[tokio::test]
async fn generation_failure_emits_error_and_halts_session() {
    let engine = Arc::new(DelayedEngine::new(15));
    let mut h = spawn_pipeline(engine, SchedulerConfig::default());

    let session = SessionId(1);
    h.scheduler.start_session(session);
    h.scheduler
        .enqueue_chunk(session, 0, "boom 5".into(), "af_heart".into(), 1.0);
    h.scheduler
        .enqueue_chunk(session, 1, "never plays 40".into(), "af_heart".into(), 1.0);

    let error = next_event_of(&mut h.rx, PlaybackEventKind::GenerationError).await;
    assert_eq!(error.chunk_index, 0);
    assert!(error.message.as_deref().unwrap_or("").contains("exploded"));

    tokio::time::sleep(Duration::from_millis(150)).await;
    let seen = drain_kinds(&mut h.rx);
    assert!(
        !seen
            .iter()
            .any(|(kind, _, _)| *kind == PlaybackEventKind::ChunkQueued),
        "audio enqueued after generation failure: {seen:?}"
    );
}

#[tokio::test]
async fn generation_deadline_force_fails_a_hung_backend() {
    let engine = Arc::new(DelayedEngine::new(15));
    let config = SchedulerConfig {
        generation_timeout: Some(Duration::from_millis(40)),
        ..SchedulerConfig::default()
    };
    let mut h = spawn_pipeline(engine, config);

    let session = SessionId(1);
    h.scheduler.start_session(session);
    h.scheduler
        .enqueue_chunk(session, 0, "stuck backend 10000".into(), "af_heart".into(), 1.0);

    let error = next_event_of(&mut h.rx, PlaybackEventKind::GenerationError).await;
    assert_eq!(error.chunk_index, 0);
    assert!(error.message.as_deref().unwrap_or("").contains("deadline"));

    // The hung chunk ends the session like any other generation failure.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let seen = drain_kinds(&mut h.rx);
    assert!(
        !seen
            .iter()
            .any(|(kind, _, _)| *kind == PlaybackEventKind::ChunkQueued),
        "audio enqueued after a deadline failure: {seen:?}"
    );
}

#[tokio::test]
async fn streaming_text_splits_and_plays_sub_chunks_in_order() {
    let engine = Arc::new(SineEngine::new(SineConfig {
        format: AudioFormat::mono(8_000),
        chars_per_second: 800.0,
        block_size: 128,
        ..SineConfig::default()
    }));
    let config = SchedulerConfig {
        max_stream_chars: 40,
        ..SchedulerConfig::default()
    };
    let mut h = spawn_pipeline(engine, config);

    let session = SessionId(1);
    h.scheduler.start_session(session);
    h.scheduler.stream_text(
        session,
        "This first sentence fills one piece. The second sentence fills another piece."
            .to_string(),
        "af_heart".into(),
        1.0,
    );

    let started = next_event_of(&mut h.rx, PlaybackEventKind::ChunkStarted).await;
    assert_eq!(started.chunk_index, 0);
    let finished = next_event_of(&mut h.rx, PlaybackEventKind::ChunkFinished).await;
    assert_eq!(finished.chunk_index, 0);

    // The next piece only begins after the first finished.
    let started = next_event_of(&mut h.rx, PlaybackEventKind::ChunkStarted).await;
    assert_eq!(started.chunk_index, 1);
    let finished = next_event_of(&mut h.rx, PlaybackEventKind::ChunkFinished).await;
    assert_eq!(finished.chunk_index, 1);
}
