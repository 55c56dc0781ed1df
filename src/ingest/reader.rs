//! Retrying JSON file reader.
//!
//! Sensor output files show up in the watched directory before the writer is
//! done with them. The reader waits before every attempt, treats an empty file
//! or a JSON syntax error as "still being written", and retries up to a fixed
//! budget. Anything else (permissions, I/O faults) ends the read immediately.

use crate::ingest::backoff::{BackoffPolicy, FixedBackoff};
use serde_json::error::Category;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default number of read attempts per file.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay before each read attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Why a single read attempt failed.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("file is empty")]
    Empty,

    #[error("invalid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("could not decode JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReadError {
    /// Whether the condition may clear up once the writer finishes.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReadError::Empty | ReadError::Syntax(_))
    }
}

impl From<serde_json::Error> for ReadError {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            Category::Syntax | Category::Eof => ReadError::Syntax(e),
            Category::Data | Category::Io => ReadError::Decode(e),
        }
    }
}

/// Terminal failure of a retrying read.
#[derive(Debug, Error)]
pub enum ReadFailure {
    /// Every attempt hit a transient condition.
    #[error("gave up after {attempts} attempt(s): {last_error}")]
    GaveUp { attempts: u32, last_error: ReadError },

    /// A non-transient error ended the read early.
    #[error("attempt {attempt} failed: {error}")]
    Fatal { attempt: u32, error: ReadError },
}

impl ReadFailure {
    /// Number of attempts made before failing.
    pub fn attempts(&self) -> u32 {
        match self {
            ReadFailure::GaveUp { attempts, .. } => *attempts,
            ReadFailure::Fatal { attempt, .. } => *attempt,
        }
    }
}

/// A parsed document and the attempt that produced it.
#[derive(Debug, Clone)]
pub struct ReadSuccess {
    pub value: Value,
    pub attempts: u32,
}

/// Reads and parses JSON files with a bounded retry budget.
#[derive(Debug, Clone)]
pub struct RetryingReader {
    retries: u32,
    backoff: Arc<dyn BackoffPolicy>,
}

impl RetryingReader {
    /// Create a reader making at most `retries` attempts (at least one).
    pub fn new(retries: u32, backoff: Arc<dyn BackoffPolicy>) -> Self {
        Self {
            retries: retries.max(1),
            backoff,
        }
    }

    /// Reader waiting the same `delay` before every attempt.
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self::new(retries, Arc::new(FixedBackoff::new(delay)))
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Read and parse `path`, retrying transient failures.
    pub fn read_json(&self, path: &Path) -> Result<ReadSuccess, ReadFailure> {
        self.read_json_with(path, |_| {})
    }

    /// Like [`RetryingReader::read_json`], calling `on_attempt` as each attempt starts.
    pub fn read_json_with(
        &self,
        path: &Path,
        mut on_attempt: impl FnMut(u32),
    ) -> Result<ReadSuccess, ReadFailure> {
        let mut last_error = None;

        for attempt in 1..=self.retries {
            let delay = self.backoff.delay_before(attempt);
            debug!(
                "Attempt {attempt} - waiting {:?} before reading {}",
                delay,
                path.display()
            );
            if !delay.is_zero() {
                thread::sleep(delay);
            }

            on_attempt(attempt);
            match read_once(path) {
                Ok(value) => return Ok(ReadSuccess { value, attempts: attempt }),
                Err(error) if error.is_transient() => {
                    warn!("Attempt {attempt} - could not read {}: {error}", path.display());
                    if attempt < self.retries {
                        info!("Retrying {} ({} attempt(s) left)", path.display(), self.retries - attempt);
                    }
                    last_error = Some(error);
                }
                Err(error) => return Err(ReadFailure::Fatal { attempt, error }),
            }
        }

        Err(ReadFailure::GaveUp {
            attempts: self.retries,
            last_error: last_error.unwrap_or(ReadError::Empty),
        })
    }
}

impl Default for RetryingReader {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

/// One read attempt: size check, read, parse.
fn read_once(path: &Path) -> Result<Value, ReadError> {
    if std::fs::metadata(path)?.len() == 0 {
        return Err(ReadError::Empty);
    }

    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(ReadError::Empty);
    }

    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;

    fn reader(retries: u32) -> RetryingReader {
        RetryingReader::fixed(retries, Duration::from_millis(5))
    }

    #[test]
    fn test_reads_valid_file_first_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.json");
        fs::write(&path, r#"{"data": []}"#).unwrap();

        let success = reader(3).read_json(&path).unwrap();
        assert_eq!(success.attempts, 1);
        assert!(success.value.get("data").is_some());
    }

    #[test]
    fn test_malformed_file_uses_whole_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"data": [1, 2"#).unwrap();

        let mut calls = 0;
        let failure = reader(3).read_json_with(&path, |_| calls += 1).unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(
            failure,
            ReadFailure::GaveUp {
                attempts: 3,
                last_error: ReadError::Syntax(_)
            }
        ));
    }

    #[test]
    fn test_empty_file_uses_whole_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(&path, "").unwrap();

        let failure = reader(4).read_json(&path).unwrap_err();
        assert_eq!(failure.attempts(), 4);
        assert!(matches!(
            failure,
            ReadFailure::GaveUp {
                last_error: ReadError::Empty,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.json");

        let mut calls = 0;
        let failure = reader(3).read_json_with(&path, |_| calls += 1).unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(
            failure,
            ReadFailure::Fatal {
                attempt: 1,
                error: ReadError::Io(_)
            }
        ));
    }

    #[test]
    fn test_empty_then_written_succeeds_after_a_delay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.json");
        fs::write(&path, "").unwrap();

        let delay = Duration::from_millis(40);
        let reader = RetryingReader::fixed(3, delay);
        let started = Instant::now();
        let success = reader
            .read_json_with(&path, |attempt| {
                if attempt == 1 {
                    return;
                }
                fs::write(&path, r#"{"data": []}"#).unwrap();
            })
            .unwrap();

        assert_eq!(success.attempts, 2);
        assert!(started.elapsed() >= delay);
    }

    #[test]
    fn test_zero_retries_still_reads_once() {
        assert_eq!(RetryingReader::fixed(0, Duration::ZERO).retries(), 1);
    }

    #[test]
    fn test_error_classification() {
        assert!(ReadError::Empty.is_transient());
        let syntax: ReadError = serde_json::from_str::<Value>("{").unwrap_err().into();
        assert!(syntax.is_transient());
        let io = ReadError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(!io.is_transient());
    }
}
