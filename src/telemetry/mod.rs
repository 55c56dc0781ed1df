//! Telemetry for the vitals agent.
//!
//! This module tracks what the pipeline did with every detected file, so
//! outcomes that never reach the result queue can still be audited.

pub mod counters;

// Re-export commonly used types
pub use counters::{
    create_shared_stats, create_shared_stats_with_persistence, InFlightGuard, PipelineStats,
    SharedPipelineStats, StatsSnapshot,
};
