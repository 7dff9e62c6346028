//! Playback worker tests against the simulated sink backend.
//!
//! These run headless: the simulated backend drains queued audio in real
//! time from each buffer's declared sample rate, so short buffers keep the
//! tests fast.

use lectern_audio::{
    AppendRecord, EventBus, PlaybackEventKind, PlaybackManager, SimulatedBackend,
};
use lectern_foundation::{PlaybackConfig, SessionId};
use lectern_tts::{AudioBuffer, AudioFormat};
use std::time::Duration;
use tokio::time::timeout;

fn buffer_of_ms(ms: usize) -> AudioBuffer {
    // 1 kHz mono: one sample per millisecond.
    AudioBuffer {
        samples: vec![0.1; ms],
        format: AudioFormat::mono(1_000),
    }
}

fn fast_config() -> PlaybackConfig {
    PlaybackConfig {
        poll_interval: Duration::from_millis(5),
        event_capacity: 256,
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

#[tokio::test]
async fn chunks_play_in_fifo_order_with_lifecycle_events() {
    let backend = SimulatedBackend::new();
    let log = backend.log();
    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let manager = PlaybackManager::spawn(backend, fast_config(), events);
    let playback = manager.handle();

    let session = SessionId(1);
    playback.start_session(session);
    playback.enqueue_buffer(session, 0, buffer_of_ms(30));
    playback.enqueue_buffer(session, 1, buffer_of_ms(30));
    playback.enqueue_buffer(session, 2, buffer_of_ms(30));

    let started = next_event_of(&mut rx, PlaybackEventKind::ChunkStarted).await;
    assert_eq!(started.chunk_index, 0);
    assert_eq!(started.session_id, session);

    for expected in 0..3 {
        let finished = next_event_of(&mut rx, PlaybackEventKind::ChunkFinished).await;
        assert_eq!(finished.chunk_index, expected);
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!playback.is_playing());

    let appends = log.lock().clone();
    assert_eq!(
        appends,
        vec![
            AppendRecord::Buffer { samples: 30 },
            AppendRecord::Buffer { samples: 30 },
            AppendRecord::Buffer { samples: 30 },
        ]
    );
    manager.shutdown();
}

#[tokio::test]
async fn finish_survives_append_in_the_same_poll_window() {
    // A slow poll interval forces chunk 0's playout end and chunk 1's
    // enqueue into the same observation window; the pop and the push must
    // not cancel out and swallow chunk 0's finish.
    let backend = SimulatedBackend::new();
    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let config = PlaybackConfig {
        poll_interval: Duration::from_millis(50),
        event_capacity: 256,
    };
    let manager = PlaybackManager::spawn(backend, config, events);
    let playback = manager.handle();

    let session = SessionId(5);
    playback.start_session(session);
    playback.enqueue_buffer(session, 0, buffer_of_ms(75));
    tokio::time::sleep(Duration::from_millis(80)).await;
    playback.enqueue_buffer(session, 1, buffer_of_ms(30));

    let finished = next_event_of(&mut rx, PlaybackEventKind::ChunkFinished).await;
    assert_eq!(finished.chunk_index, 0);
    let finished = next_event_of(&mut rx, PlaybackEventKind::ChunkFinished).await;
    assert_eq!(finished.chunk_index, 1);
    manager.shutdown();
}

#[tokio::test]
async fn enqueue_for_inactive_session_is_dropped() {
    let backend = SimulatedBackend::new();
    let log = backend.log();
    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let manager = PlaybackManager::spawn(backend, fast_config(), events);
    let playback = manager.handle();

    playback.start_session(SessionId(1));
    playback.start_session(SessionId(2));
    // A result from the superseded session arrives late.
    playback.enqueue_buffer(SessionId(1), 0, buffer_of_ms(10));
    playback.enqueue_buffer(SessionId(2), 0, buffer_of_ms(10));

    let queued = next_event_of(&mut rx, PlaybackEventKind::ChunkQueued).await;
    assert_eq!(queued.session_id, SessionId(2));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.lock().len(), 1, "stale session audio must not reach the sink");
    manager.shutdown();
}

#[tokio::test]
async fn stop_clears_queue_and_is_idempotent() {
    let backend = SimulatedBackend::new();
    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let manager = PlaybackManager::spawn(backend, fast_config(), events);
    let playback = manager.handle();

    let session = SessionId(7);
    playback.start_session(session);
    playback.enqueue_buffer(session, 0, buffer_of_ms(500));
    let _ = next_event_of(&mut rx, PlaybackEventKind::ChunkStarted).await;
    assert!(playback.is_playing());

    playback.stop();
    playback.stop();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!playback.is_playing());
    assert!(!playback.is_paused());
    assert_eq!(playback.queued_chunks(), 0);

    // Manager remains usable after stop.
    playback.start_session(SessionId(8));
    playback.enqueue_buffer(SessionId(8), 0, buffer_of_ms(10));
    let started = next_event_of(&mut rx, PlaybackEventKind::ChunkStarted).await;
    assert_eq!(started.session_id, SessionId(8));
    manager.shutdown();
}

#[tokio::test]
async fn pause_and_resume_gate_playback() {
    let backend = SimulatedBackend::new();
    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let manager = PlaybackManager::spawn(backend, fast_config(), events);
    let playback = manager.handle();

    let session = SessionId(3);
    playback.start_session(session);
    playback.enqueue_buffer(session, 0, buffer_of_ms(200));
    let _ = next_event_of(&mut rx, PlaybackEventKind::ChunkStarted).await;

    playback.pause();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(playback.is_paused());
    assert!(!playback.is_playing());
    assert_eq!(playback.queued_chunks(), 1);

    playback.resume();
    let finished = next_event_of(&mut rx, PlaybackEventKind::ChunkFinished).await;
    assert_eq!(finished.chunk_index, 0);
    assert!(!playback.is_paused());
    manager.shutdown();
}

#[tokio::test]
async fn streaming_source_plays_while_producer_pushes() {
    let backend = SimulatedBackend::new();
    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let manager = PlaybackManager::spawn(backend, fast_config(), events);
    let playback = manager.handle();

    let session = SessionId(4);
    let format = AudioFormat::mono(1_000);
    let (tx, source) =
        lectern_audio::StreamingSource::channel(&lectern_foundation::StreamConfig::default(), format);

    playback.start_session(session);
    playback.enqueue_stream(session, 0, source);

    let started = next_event_of(&mut rx, PlaybackEventKind::ChunkStarted).await;
    assert_eq!(started.chunk_index, 0);

    // Producer trickles blocks, then closes.
    let producer = std::thread::spawn(move || {
        for _ in 0..3 {
            tx.push(vec![0.2; 10]).unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }
    });
    producer.join().unwrap();

    let finished = next_event_of(&mut rx, PlaybackEventKind::ChunkFinished).await;
    assert_eq!(finished.chunk_index, 0);
    manager.shutdown();
}
