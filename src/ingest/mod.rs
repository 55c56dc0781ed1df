//! Concurrent ingestion of sensor output files.
//!
//! ```text
//! notify ──▶ watcher thread ──▶ EventRouter ──claim──▶ DedupRegistry
//!                                   │
//!                                   ▼ dispatch (thread per file | worker pool)
//!                            FileProcessor: RetryingReader → frames → features → model
//!                                   │
//!                                   ▼
//!                              ResultQueue
//! ```

pub mod backoff;
pub mod dedup;
pub mod dispatch;
pub mod processor;
pub mod reader;
pub mod watcher;

// Re-export commonly used types
pub use backoff::{BackoffPolicy, BackoffStrategy, ExponentialBackoff, FixedBackoff};
pub use dedup::DedupRegistry;
pub use dispatch::{DispatchError, DispatchPolicy, Dispatcher, Job};
pub use processor::{FileOutcome, FileProcessor, ProcessorStage};
pub use reader::{ReadError, ReadFailure, ReadSuccess, RetryingReader};
pub use watcher::{
    DirectoryWatcher, EventRouter, FileEvent, FileEventKind, RouteDecision, WatchError,
    WatcherHandle,
};
