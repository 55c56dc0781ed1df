//! Synheart Vitals Agent - live vital-sign inference from radar sensor output.
//!
//! The sensor's visualizer drops JSON files into a directory while it records.
//! This library watches that directory, reads each new file once it has been
//! fully written, turns every vitals frame into the model's feature vector,
//! and hands the predictions to a display consumer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Synheart Vitals Agent                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌────────────────────────────┐  │
//! │  │  Watcher  │──▶│  Dedup    │──▶│ FileProcessor (per file)   │  │
//! │  │ (notify)  │   │ Registry  │   │ read → frames → features   │  │
//! │  └───────────┘   └───────────┘   │        → model             │  │
//! │                                  └─────────────┬──────────────┘  │
//! │                                                ▼                 │
//! │  ┌───────────┐   ┌───────────┐         ┌─────────────┐           │
//! │  │  Display  │◀──│ Consumer  │◀────────│ ResultQueue │           │
//! │  │   Sink    │   │ (polling) │         └─────────────┘           │
//! │  └───────────┘   └───────────┘                                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use synheart_vitals_agent::{
//!     inference::LinearModel, telemetry::create_shared_stats, ConsoleSink, DedupRegistry,
//!     DirectoryWatcher, DispatchPolicy, Dispatcher, EventRouter, FileProcessor, QueueConsumer,
//!     ResultQueue, RetryingReader,
//! };
//!
//! let model = Arc::new(LinearModel::load("vitals_model.json").expect("model"));
//! let queue = ResultQueue::new();
//! let processor = FileProcessor::new(
//!     RetryingReader::default(),
//!     model,
//!     queue.clone(),
//!     create_shared_stats(),
//! );
//! let router = EventRouter::new(
//!     ".json",
//!     Arc::new(DedupRegistry::new()),
//!     processor,
//!     Dispatcher::new(DispatchPolicy::ThreadPerFile).expect("dispatcher"),
//! );
//! let _watcher = DirectoryWatcher::start("binData", true, router).expect("watcher");
//! let _consumer = QueueConsumer::new(queue, Box::new(ConsoleSink::stdout()))
//!     .spawn(Duration::from_millis(100))
//!     .expect("consumer");
//! ```

pub mod config;
pub mod core;
pub mod inference;
pub mod ingest;
pub mod output;
pub mod telemetry;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{vectorize, FeatureSchema, FeatureVector, PredictionResult, VitalsFrame};
pub use inference::{InferenceError, InferenceModel, LinearModel};
pub use ingest::{
    DedupRegistry, DirectoryWatcher, DispatchPolicy, Dispatcher, EventRouter, FileOutcome,
    FileProcessor, RetryingReader, WatchError, WatcherHandle,
};
pub use output::{ConsoleSink, JsonlSink, QueueConsumer, ResultQueue, ResultSink};
pub use telemetry::{PipelineStats, SharedPipelineStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
