//! Producer-side handle of a streaming sample queue.
//!
//! A streaming engine is handed a `FrameSink` and pushes sample blocks into
//! it as they come off the model. The consumer end is a pull-based audio
//! source owned by the playback thread; when that source is dropped the
//! sink observes the disconnect and the engine stops pushing.

use crossbeam_channel::{SendTimeoutError, Sender};
use std::time::Duration;
use thiserror::Error;

/// The consumer dropped the streaming source; the producer must stop.
#[derive(Debug, Error)]
#[error("streaming consumer abandoned the source")]
pub struct StreamAbandoned;

/// Bounded, blocking producer handle for one chunk's live generation.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: Sender<Vec<f32>>,
    push_timeout: Duration,
}

impl FrameSink {
    pub fn new(tx: Sender<Vec<f32>>, push_timeout: Duration) -> Self {
        Self { tx, push_timeout }
    }

    /// Push one block of samples, blocking under backpressure.
    ///
    /// Retries on timeout so no audio is ever dropped; between retries the
    /// disconnect check guarantees an abandoned source cannot stall the
    /// producer forever.
    pub fn push(&self, block: Vec<f32>) -> Result<(), StreamAbandoned> {
        let mut block = block;
        loop {
            match self.tx.send_timeout(block, self.push_timeout) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => {
                    tracing::trace!(target: "tts", "frame queue full, retrying push");
                    block = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(StreamAbandoned),
            }
        }
    }
}
