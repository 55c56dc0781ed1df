//! Pipeline counters.
//!
//! File processors never report back to the watcher, so these counters and
//! the log output are the only place outcomes become visible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Atomic counters shared by the watcher, every processor and the consumer.
#[derive(Debug)]
pub struct PipelineStats {
    /// Qualifying files claimed for processing
    files_detected: AtomicU64,
    /// Events dropped because the file was already claimed
    duplicate_events: AtomicU64,
    /// Files fully read and walked
    files_completed: AtomicU64,
    /// Files dropped after exhausting read retries
    files_gave_up: AtomicU64,
    /// Files abandoned on a fatal error
    files_failed: AtomicU64,
    /// Read attempts across all files
    read_attempts: AtomicU64,
    /// Frames that produced a prediction
    frames_predicted: AtomicU64,
    /// Frames dropped on an extraction or inference error
    frames_failed: AtomicU64,
    /// Results forwarded to the display sink
    results_delivered: AtomicU64,
    /// Processors currently running
    in_flight: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            files_detected: AtomicU64::new(0),
            duplicate_events: AtomicU64::new(0),
            files_completed: AtomicU64::new(0),
            files_gave_up: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            read_attempts: AtomicU64::new(0),
            frames_predicted: AtomicU64::new(0),
            frames_failed: AtomicU64::new(0),
            results_delivered: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that load from and save to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous pipeline stats: {e}");
        }

        stats
    }

    pub fn record_file_detected(&self) {
        self.files_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_event(&self) {
        self.duplicate_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_completed(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_gave_up(&self) {
        self.files_gave_up.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_attempt(&self) {
        self.read_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_predicted(&self) {
        self.frames_predicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_failed(&self) {
        self.frames_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_results_delivered(&self, count: u64) {
        self.results_delivered.fetch_add(count, Ordering::Relaxed);
    }

    /// Mark a processor as running until the returned guard is dropped.
    pub fn track_in_flight(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            stats: Arc::clone(self),
        }
    }

    /// Number of processors currently running.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_detected: self.files_detected.load(Ordering::Relaxed),
            duplicate_events: self.duplicate_events.load(Ordering::Relaxed),
            files_completed: self.files_completed.load(Ordering::Relaxed),
            files_gave_up: self.files_gave_up.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            read_attempts: self.read_attempts.load(Ordering::Relaxed),
            frames_predicted: self.frames_predicted.load(Ordering::Relaxed),
            frames_failed: self.frames_failed.load(Ordering::Relaxed),
            results_delivered: self.results_delivered.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Pipeline Statistics (lifetime totals):\n\
             - Files detected: {}\n\
             - Duplicate events ignored: {}\n\
             - Files completed: {}\n\
             - Files given up (retries exhausted): {}\n\
             - Files failed: {}\n\
             - Read attempts: {}\n\
             - Frames predicted: {}\n\
             - Frames failed: {}\n\
             - Results delivered: {}\n\
             - Session duration: {} seconds",
            stats.files_detected,
            stats.duplicate_events,
            stats.files_completed,
            stats.files_gave_up,
            stats.files_failed,
            stats.read_attempts,
            stats.frames_predicted,
            stats.frames_failed,
            stats.results_delivered,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                files_detected: stats.files_detected,
                duplicate_events: stats.duplicate_events,
                files_completed: stats.files_completed,
                files_gave_up: stats.files_gave_up,
                files_failed: stats.files_failed,
                read_attempts: stats.read_attempts,
                frames_predicted: stats.frames_predicted,
                frames_failed: stats.frames_failed,
                results_delivered: stats.results_delivered,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                for (counter, value) in [
                    (&self.files_detected, persisted.files_detected),
                    (&self.duplicate_events, persisted.duplicate_events),
                    (&self.files_completed, persisted.files_completed),
                    (&self.files_gave_up, persisted.files_gave_up),
                    (&self.files_failed, persisted.files_failed),
                    (&self.read_attempts, persisted.read_attempts),
                    (&self.frames_predicted, persisted.frames_predicted),
                    (&self.frames_failed, persisted.frames_failed),
                    (&self.results_delivered, persisted.results_delivered),
                ] {
                    counter.store(value, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.files_detected,
            &self.duplicate_events,
            &self.files_completed,
            &self.files_gave_up,
            &self.files_failed,
            &self.read_attempts,
            &self.frames_predicted,
            &self.frames_failed,
            &self.results_delivered,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight gauge on drop, including on unwind.
#[derive(Debug)]
pub struct InFlightGuard {
    stats: SharedPipelineStats,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Snapshot of pipeline statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub files_detected: u64,
    pub duplicate_events: u64,
    pub files_completed: u64,
    pub files_gave_up: u64,
    pub files_failed: u64,
    pub read_attempts: u64,
    pub frames_predicted: u64,
    pub frames_failed: u64,
    pub results_delivered: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence. Every counter is a lifetime total.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    files_detected: u64,
    #[serde(default)]
    duplicate_events: u64,
    files_completed: u64,
    files_gave_up: u64,
    files_failed: u64,
    #[serde(default)]
    read_attempts: u64,
    frames_predicted: u64,
    frames_failed: u64,
    #[serde(default)]
    results_delivered: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared pipeline stats.
pub type SharedPipelineStats = Arc<PipelineStats>;

pub fn create_shared_stats() -> SharedPipelineStats {
    Arc::new(PipelineStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedPipelineStats {
    Arc::new(PipelineStats::with_persistence(path))
}
