//! Channel-backed streaming audio source.
//!
//! Bridges an asynchronous frame producer to the real-time pull side of the
//! audio sink. Samples arrive as blocks over a bounded crossbeam channel;
//! the pull side buffers them and yields one sample at a time. When the
//! producer stalls longer than the pull timeout the source yields silence
//! instead of underrunning; when the producer closes the channel and the
//! buffer drains, the source ends.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use lectern_foundation::StreamConfig;
use lectern_tts::{AudioFormat, FrameSink};
use rodio::Source;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug)]
pub struct StreamingSource {
    rx: Receiver<Vec<f32>>,
    buffer: VecDeque<f32>,
    format: AudioFormat,
    pull_timeout: Duration,
    finished: bool,
    closed: bool,
}

impl StreamingSource {
    /// Create a producer/consumer pair bound to one chunk's live generation.
    pub fn channel(config: &StreamConfig, format: AudioFormat) -> (FrameSink, StreamingSource) {
        let (tx, rx) = bounded(config.queue_capacity.max(1));
        let sink = FrameSink::new(tx, config.push_timeout);
        let source = StreamingSource {
            rx,
            buffer: VecDeque::with_capacity(format.sample_rate as usize),
            format,
            pull_timeout: config.pull_timeout,
            finished: false,
            closed: false,
        };
        (sink, source)
    }

    /// Non-blocking drain of every block already in the channel.
    fn try_fill_buffer(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(samples) => self.buffer.extend(samples),
                Err(crossbeam_channel::TryRecvError::Empty) => break,
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
    }

    /// Consume up to `max` buffered samples without blocking. Used by the
    /// simulated sink backend to model real-time playout.
    pub(crate) fn consume_available(&mut self, max: usize) -> usize {
        self.try_fill_buffer();
        let n = max.min(self.buffer.len());
        self.buffer.drain(..n);
        n
    }

    /// Producer closed the queue and every buffered sample was consumed.
    pub(crate) fn is_drained(&self) -> bool {
        self.closed && self.buffer.is_empty()
    }
}

impl Iterator for StreamingSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished {
            return None;
        }

        if let Some(sample) = self.buffer.pop_front() {
            return Some(sample);
        }

        match self.rx.recv_timeout(self.pull_timeout) {
            Ok(samples) => {
                self.buffer.extend(samples);
                self.buffer.pop_front()
            }
            // Producer slower than playback: yield silence, try again on
            // the next pull.
            Err(RecvTimeoutError::Timeout) => Some(0.0),
            Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                self.try_fill_buffer();
                match self.buffer.pop_front() {
                    Some(sample) => Some(sample),
                    None => {
                        self.finished = true;
                        None
                    }
                }
            }
        }
    }
}

impl Source for StreamingSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.format.channels
    }

    fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
