//! Result queue between file processors and the display consumer.

use crate::core::prediction::PredictionResult;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Unbounded multi-producer FIFO of prediction results.
///
/// Clones share the same queue. `enqueue` never blocks, and each result is
/// handed out by exactly one `drain_all` call.
#[derive(Debug, Clone)]
pub struct ResultQueue {
    sender: Sender<PredictionResult>,
    receiver: Receiver<PredictionResult>,
}

impl ResultQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Append a result.
    pub fn enqueue(&self, result: PredictionResult) {
        // Every clone holds the receiver, so the channel cannot be disconnected here.
        if self.sender.send(result).is_err() {
            tracing::error!("Result queue disconnected; dropping result");
        }
    }

    /// Take every result currently queued, oldest first, without blocking.
    pub fn drain_all(&self) -> Vec<PredictionResult> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for ResultQueue {
    fn default() -> Self {
        Self::new()
    }
}
