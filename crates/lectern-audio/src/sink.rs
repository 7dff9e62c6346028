//! Audio sink abstraction.
//!
//! The playback worker owns exactly one sink at a time and talks to it
//! through these traits, so the same worker runs against a real output
//! device or against a simulated, clock-driven sink in headless tests. A
//! backend is `Send` so it can move into the audio thread; the factory and
//! sinks it produces live on that thread only (rodio's output stream is not
//! `Send`).

use crate::streaming_source::StreamingSource;
use lectern_foundation::error::AudioError;
use lectern_tts::AudioBuffer;
use parking_lot::Mutex;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source as _};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// One playback queue. Append order is playback order.
pub trait AudioSink {
    fn append_buffer(&mut self, buffer: AudioBuffer);
    fn append_stream(&mut self, source: StreamingSource);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    /// Queued items, including the one currently playing.
    fn queued(&self) -> usize;
    /// Advance simulated playout. No-op for real devices.
    fn poll(&mut self) {}
}

/// Creates one sink per session on the audio thread.
pub trait SinkFactory {
    fn new_sink(&mut self) -> Result<Box<dyn AudioSink>, AudioError>;
}

/// Opens an output device. Consumed on the audio thread.
pub trait SinkBackend: Send + 'static {
    type Factory: SinkFactory;
    fn open(self) -> Result<Self::Factory, AudioError>;
}

// ---------------------------------------------------------------------------
// rodio backend
// ---------------------------------------------------------------------------

/// Default backend: the system output device via rodio.
#[derive(Debug, Default)]
pub struct RodioBackend;

pub struct RodioFactory {
    // Keeps the device stream alive for the factory lifetime.
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl SinkBackend for RodioBackend {
    type Factory = RodioFactory;

    fn open(self) -> Result<RodioFactory, AudioError> {
        let (stream, handle) = OutputStream::try_default()?;
        Ok(RodioFactory {
            _stream: stream,
            handle,
        })
    }
}

impl SinkFactory for RodioFactory {
    fn new_sink(&mut self) -> Result<Box<dyn AudioSink>, AudioError> {
        let sink = Sink::try_new(&self.handle)?;
        Ok(Box::new(RodioSink { sink }))
    }
}

struct RodioSink {
    sink: Sink,
}

impl AudioSink for RodioSink {
    fn append_buffer(&mut self, buffer: AudioBuffer) {
        let source = SamplesBuffer::new(
            buffer.format.channels,
            buffer.format.sample_rate,
            buffer.samples,
        );
        self.sink.append(source);
    }

    fn append_stream(&mut self, source: StreamingSource) {
        self.sink.append(source);
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn stop(&mut self) {
        self.sink.stop();
    }

    fn queued(&self) -> usize {
        self.sink.len()
    }
}

// ---------------------------------------------------------------------------
// simulated backend
// ---------------------------------------------------------------------------

/// What was appended to a simulated sink, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendRecord {
    Buffer { samples: usize },
    Stream,
}

pub type AppendLog = Arc<Mutex<Vec<AppendRecord>>>;

/// Headless backend that drains queued audio in real time based on each
/// item's declared sample rate. Lets the full pipeline run in tests with no
/// audio device.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    log: AppendLog,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared append log; clone before spawning the playback manager.
    pub fn log(&self) -> AppendLog {
        Arc::clone(&self.log)
    }
}

pub struct SimulatedFactory {
    log: AppendLog,
}

impl SinkBackend for SimulatedBackend {
    type Factory = SimulatedFactory;

    fn open(self) -> Result<SimulatedFactory, AudioError> {
        Ok(SimulatedFactory { log: self.log })
    }
}

impl SinkFactory for SimulatedFactory {
    fn new_sink(&mut self) -> Result<Box<dyn AudioSink>, AudioError> {
        Ok(Box::new(SimulatedSink {
            log: Arc::clone(&self.log),
            items: VecDeque::new(),
            paused: false,
            last_tick: Instant::now(),
        }))
    }
}

enum SimulatedItem {
    Buffer {
        remaining: usize,
        samples_per_sec: f64,
    },
    Stream(StreamingSource),
}

struct SimulatedSink {
    log: AppendLog,
    items: VecDeque<SimulatedItem>,
    paused: bool,
    last_tick: Instant,
}

impl AudioSink for SimulatedSink {
    fn append_buffer(&mut self, buffer: AudioBuffer) {
        self.log.lock().push(AppendRecord::Buffer {
            samples: buffer.samples.len(),
        });
        self.items.push_back(SimulatedItem::Buffer {
            remaining: buffer.samples.len(),
            samples_per_sec: buffer.format.sample_rate as f64 * buffer.format.channels as f64,
        });
    }

    fn append_stream(&mut self, source: StreamingSource) {
        self.log.lock().push(AppendRecord::Stream);
        self.items.push_back(SimulatedItem::Stream(source));
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn stop(&mut self) {
        self.items.clear();
    }

    fn queued(&self) -> usize {
        self.items.len()
    }

    fn poll(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;
        if self.paused {
            return;
        }

        let mut budget = elapsed.as_secs_f64();
        while budget > 0.0 {
            let Some(front) = self.items.front_mut() else {
                break;
            };
            match front {
                SimulatedItem::Buffer {
                    remaining,
                    samples_per_sec,
                } => {
                    let can_play = (budget * *samples_per_sec) as usize;
                    if can_play >= *remaining {
                        budget -= *remaining as f64 / *samples_per_sec;
                        self.items.pop_front();
                    } else {
                        *remaining -= can_play;
                        budget = 0.0;
                    }
                }
                SimulatedItem::Stream(source) => {
                    let rate = source.sample_rate() as f64 * source.channels() as f64;
                    let want = (budget * rate) as usize;
                    source.consume_available(want);
                    if source.is_drained() {
                        self.items.pop_front();
                    }
                    // Underrun plays silence; the time is spent either way.
                    budget = 0.0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_foundation::StreamConfig;
    use lectern_tts::AudioFormat;
    use std::time::Duration;

    fn buffer_of(ms: u64) -> AudioBuffer {
        let format = AudioFormat::mono(1_000);
        AudioBuffer {
            samples: vec![0.0; ms as usize],
            format,
        }
    }

    #[test]
    fn simulated_sink_drains_buffers_in_real_time() {
        let mut factory = SimulatedBackend::new().open().unwrap();
        let mut sink = factory.new_sink().unwrap();
        sink.append_buffer(buffer_of(20));
        sink.append_buffer(buffer_of(20));
        assert_eq!(sink.queued(), 2);

        std::thread::sleep(Duration::from_millis(30));
        sink.poll();
        assert_eq!(sink.queued(), 1);

        std::thread::sleep(Duration::from_millis(30));
        sink.poll();
        assert_eq!(sink.queued(), 0);
    }

    #[test]
    fn paused_sink_does_not_drain() {
        let mut factory = SimulatedBackend::new().open().unwrap();
        let mut sink = factory.new_sink().unwrap();
        sink.append_buffer(buffer_of(10));
        sink.pause();
        std::thread::sleep(Duration::from_millis(30));
        sink.poll();
        assert_eq!(sink.queued(), 1);

        sink.resume();
        std::thread::sleep(Duration::from_millis(30));
        sink.poll();
        assert_eq!(sink.queued(), 0);
    }

    #[test]
    fn stream_item_finishes_when_producer_closes() {
        let mut factory = SimulatedBackend::new().open().unwrap();
        let mut sink = factory.new_sink().unwrap();
        let (tx, source) = StreamingSource::channel(&StreamConfig::default(), AudioFormat::mono(1_000));
        sink.append_stream(source);
        tx.push(vec![0.0; 10]).unwrap();
        drop(tx);

        std::thread::sleep(Duration::from_millis(30));
        sink.poll();
        assert_eq!(sink.queued(), 0);
    }

    #[test]
    fn append_log_records_order() {
        let backend = SimulatedBackend::new();
        let log = backend.log();
        let mut factory = backend.open().unwrap();
        let mut sink = factory.new_sink().unwrap();
        sink.append_buffer(buffer_of(5));
        let (_tx, source) = StreamingSource::channel(&StreamConfig::default(), AudioFormat::mono(1_000));
        sink.append_stream(source);

        let records = log.lock().clone();
        assert_eq!(
            records,
            vec![AppendRecord::Buffer { samples: 5 }, AppendRecord::Stream]
        );
    }
}
