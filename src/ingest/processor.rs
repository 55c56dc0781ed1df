//! Per-file orchestration: read, extract, vectorize, infer, enqueue.
//!
//! ```text
//! Started → Reading ─┬─▶ { Extracting → Vectorizing → Inferring → Enqueuing }* → Done
//!                    ├─▶ GaveUp → Done
//!                    └─▶ Failed → Done
//! ```
//!
//! Only the read stage retries. A frame that fails extraction or inference is
//! logged and counted, and the remaining frames of the file still run.
//! Nothing is returned to the watcher; outcomes surface through logs and
//! [`PipelineStats`](crate::telemetry::PipelineStats).

use crate::core::features::vectorize;
use crate::core::frames::{extract_frames, ExtractError, ExtractedFrame};
use crate::core::prediction::PredictionResult;
use crate::inference::{InferenceError, InferenceModel};
use crate::ingest::reader::{ReadFailure, RetryingReader};
use crate::output::queue::ResultQueue;
use crate::telemetry::SharedPipelineStats;
use chrono::Utc;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Stage a processor was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStage {
    Started,
    Reading,
    Extracting,
    Vectorizing,
    Inferring,
    Enqueuing,
    Done,
}

/// How processing of one file ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// The file was read and every frame was attempted.
    Completed {
        attempts: u32,
        frames_enqueued: usize,
        frames_failed: usize,
    },
    /// Read retries ran out.
    GaveUp { attempts: u32, reason: String },
    /// A fatal error ended processing before any frame was attempted.
    Failed {
        stage: ProcessorStage,
        reason: String,
    },
}

impl FileOutcome {
    /// Number of results this file put on the queue.
    pub fn frames_enqueued(&self) -> usize {
        match self {
            FileOutcome::Completed {
                frames_enqueued, ..
            } => *frames_enqueued,
            FileOutcome::GaveUp { .. } | FileOutcome::Failed { .. } => 0,
        }
    }
}

/// Per-frame failure, isolated from sibling frames.
#[derive(Debug, thiserror::Error)]
enum FrameError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("model panicked: {0}")]
    Panicked(String),
}

/// Runs the whole pipeline for a single file.
#[derive(Clone)]
pub struct FileProcessor {
    reader: RetryingReader,
    model: Arc<dyn InferenceModel>,
    queue: ResultQueue,
    stats: SharedPipelineStats,
}

impl FileProcessor {
    pub fn new(
        reader: RetryingReader,
        model: Arc<dyn InferenceModel>,
        queue: ResultQueue,
        stats: SharedPipelineStats,
    ) -> Self {
        Self {
            reader,
            model,
            queue,
            stats,
        }
    }

    pub fn queue(&self) -> &ResultQueue {
        &self.queue
    }

    pub fn stats(&self) -> &SharedPipelineStats {
        &self.stats
    }

    /// Process `path` to completion. Never panics on bad input.
    pub fn process(&self, path: &Path) -> FileOutcome {
        let _in_flight = self.stats.track_in_flight();
        debug!("{}: {:?}", path.display(), ProcessorStage::Started);

        let outcome = self.run(path);

        match &outcome {
            FileOutcome::Completed {
                frames_enqueued,
                frames_failed,
                ..
            } => {
                self.stats.record_file_completed();
                info!(
                    "Processed {}: {} prediction(s), {} frame(s) failed",
                    path.display(),
                    frames_enqueued,
                    frames_failed
                );
            }
            FileOutcome::GaveUp { attempts, reason } => {
                self.stats.record_file_gave_up();
                warn!(
                    "Failed to process {} after {} attempt(s): {}",
                    path.display(),
                    attempts,
                    reason
                );
            }
            FileOutcome::Failed { stage, reason, .. } => {
                self.stats.record_file_failed();
                error!("Skipping {} ({:?}): {}", path.display(), stage, reason);
            }
        }
        debug!("{}: {:?}", path.display(), ProcessorStage::Done);

        outcome
    }

    fn run(&self, path: &Path) -> FileOutcome {
        debug!("{}: {:?}", path.display(), ProcessorStage::Reading);
        let stats = &self.stats;
        let read = self
            .reader
            .read_json_with(path, |attempt| {
                stats.record_read_attempt();
                info!("Attempt {attempt} - processing file: {}", path.display());
            });

        let document = match read {
            Ok(success) => success,
            Err(failure @ ReadFailure::GaveUp { .. }) => {
                return FileOutcome::GaveUp {
                    attempts: failure.attempts(),
                    reason: failure.to_string(),
                }
            }
            Err(failure @ ReadFailure::Fatal { .. }) => {
                return FileOutcome::Failed {
                    stage: ProcessorStage::Reading,
                    reason: failure.to_string(),
                }
            }
        };

        debug!("{}: {:?}", path.display(), ProcessorStage::Extracting);
        let frames = match extract_frames(&document.value) {
            Ok(frames) => frames,
            Err(e) => {
                return FileOutcome::Failed {
                    stage: ProcessorStage::Extracting,
                    reason: e.to_string(),
                }
            }
        };

        let mut frames_enqueued = 0;
        let mut frames_failed = 0;
        for item in frames {
            match item
                .map_err(FrameError::from)
                .and_then(|frame| self.predict(path, frame))
            {
                Ok(result) => {
                    trace!("{}#{}: {:?}", path.display(), result.frame_index, ProcessorStage::Enqueuing);
                    self.queue.enqueue(result);
                    self.stats.record_frame_predicted();
                    frames_enqueued += 1;
                }
                Err(e) => {
                    self.stats.record_frame_failed();
                    frames_failed += 1;
                    warn!("{}: dropping frame: {}", path.display(), e);
                }
            }
        }

        FileOutcome::Completed {
            attempts: document.attempts,
            frames_enqueued,
            frames_failed,
        }
    }

    /// Vectorize and infer one frame.
    fn predict(&self, path: &Path, extracted: ExtractedFrame) -> Result<PredictionResult, FrameError> {
        let ExtractedFrame { entry_index, frame } = extracted;

        trace!("{}#{}: {:?}", path.display(), entry_index, ProcessorStage::Vectorizing);
        let features = vectorize(&frame, self.model.schema());

        trace!("{}#{}: {:?}", path.display(), entry_index, ProcessorStage::Inferring);
        let model = &self.model;
        let predicted = panic::catch_unwind(AssertUnwindSafe(|| model.predict(&features)))
            .map_err(|payload| FrameError::Panicked(panic_message(payload.as_ref())))??;

        Ok(PredictionResult {
            predicted_heart_rate: predicted,
            reference_heart_rate: frame.heart_rate.unwrap_or(0.0),
            breath_rate: frame.breath_rate.unwrap_or(0.0),
            source: PathBuf::from(path),
            frame_index: entry_index,
            produced_at: Utc::now(),
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
