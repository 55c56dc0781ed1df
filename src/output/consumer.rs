//! Fixed-interval consumer draining the result queue into a sink.
//!
//! Worst-case latency from enqueue to display is one poll interval.

use crate::output::queue::ResultQueue;
use crate::output::sink::ResultSink;
use crate::telemetry::SharedPipelineStats;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Drains the queue on each tick and forwards the batch to its sink.
pub struct QueueConsumer {
    queue: ResultQueue,
    sink: Box<dyn ResultSink>,
    stats: Option<SharedPipelineStats>,
    delivered: u64,
}

impl QueueConsumer {
    pub fn new(queue: ResultQueue, sink: Box<dyn ResultSink>) -> Self {
        Self {
            queue,
            sink,
            stats: None,
            delivered: 0,
        }
    }

    /// Count delivered results in `stats`.
    pub fn with_stats(mut self, stats: SharedPipelineStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Drain everything currently queued and deliver it. Returns the batch size.
    pub fn tick(&mut self) -> usize {
        let batch = self.queue.drain_all();
        if batch.is_empty() {
            return 0;
        }

        if let Err(e) = self.sink.deliver(&batch) {
            tracing::warn!("Display sink failed for {} result(s): {}", batch.len(), e);
        }

        self.delivered += batch.len() as u64;
        if let Some(ref stats) = self.stats {
            stats.record_results_delivered(batch.len() as u64);
        }
        batch.len()
    }

    /// Results delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Run the poll loop on its own thread.
    pub fn spawn(mut self, interval: Duration) -> std::io::Result<ConsumerHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let join = thread::Builder::new()
            .name("vitals-consumer".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            self.tick();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                // Final drain so nothing queued before stop is lost.
                self.tick();
                self
            })?;

        Ok(ConsumerHandle {
            stop_tx,
            join: Some(join),
        })
    }
}

/// Handle to a running consumer thread.
pub struct ConsumerHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<QueueConsumer>>,
}

impl ConsumerHandle {
    /// Stop polling after one last drain and get the consumer back.
    pub fn stop(mut self) -> Option<QueueConsumer> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<QueueConsumer> {
        let _ = self.stop_tx.try_send(());
        let join = self.join.take()?;
        match join.join() {
            Ok(consumer) => Some(consumer),
            Err(_) => {
                tracing::error!("Consumer thread panicked");
                None
            }
        }
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prediction::PredictionResult;
    use crate::telemetry::create_shared_stats;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Collecting(Arc<Mutex<Vec<PredictionResult>>>);

    impl ResultSink for Collecting {
        fn deliver(&mut self, batch: &[PredictionResult]) -> std::io::Result<()> {
            self.0.lock().unwrap().extend_from_slice(batch);
            Ok(())
        }
    }

    fn result(i: usize) -> PredictionResult {
        PredictionResult {
            predicted_heart_rate: 60.0 + i as f64,
            reference_heart_rate: 60.0,
            breath_rate: 12.0,
            source: PathBuf::from("f.json"),
            frame_index: i,
            produced_at: Utc::now(),
        }
    }

    #[test]
    fn test_tick_on_empty_queue() {
        let mut consumer = QueueConsumer::new(ResultQueue::new(), Box::new(Collecting::default()));
        assert_eq!(consumer.tick(), 0);
        assert_eq!(consumer.delivered(), 0);
    }

    #[test]
    fn test_tick_drains_everything() {
        let queue = ResultQueue::new();
        let sink = Collecting::default();
        let stats = create_shared_stats();
        let mut consumer =
            QueueConsumer::new(queue.clone(), Box::new(sink.clone())).with_stats(stats.clone());

        queue.enqueue(result(0));
        queue.enqueue(result(1));
        assert_eq!(consumer.tick(), 2);
        assert!(queue.is_empty());
        assert_eq!(sink.0.lock().unwrap().len(), 2);
        assert_eq!(stats.stats().results_delivered, 2);
    }

    #[test]
    fn test_spawned_consumer_polls_and_drains_on_stop() {
        let queue = ResultQueue::new();
        let sink = Collecting::default();
        let handle = QueueConsumer::new(queue.clone(), Box::new(sink.clone()))
            .spawn(Duration::from_millis(10))
            .unwrap();

        queue.enqueue(result(0));
        let deadline = Instant::now() + Duration::from_secs(2);
        while sink.0.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sink.0.lock().unwrap().len(), 1);

        queue.enqueue(result(1));
        let consumer = handle.stop().unwrap();
        assert_eq!(consumer.delivered(), 2);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }
}
