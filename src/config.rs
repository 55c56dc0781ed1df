//! Configuration for the Synheart Vitals Agent.

use crate::ingest::backoff::BackoffStrategy;
use crate::ingest::dispatch::DispatchPolicy;
use crate::ingest::reader::{DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the vitals agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the sensor writes its output files into
    pub watch_dir: PathBuf,

    /// Only files whose path ends with this suffix are processed
    pub file_suffix: String,

    /// Watch subdirectories as well
    pub recursive: bool,

    /// Read attempts per file
    pub retries: u32,

    /// Delay before each read attempt (in seconds)
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,

    /// How the delay evolves across attempts
    pub backoff: BackoffStrategy,

    /// How often the display consumer drains results (in milliseconds)
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Scheduling of file processors
    pub dispatch: DispatchPolicy,

    /// Path of the model weights file
    pub model_path: PathBuf,

    /// Path for storing pipeline statistics
    pub data_path: PathBuf,

    /// Directory for exported predictions when no explicit file is given
    pub export_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-vitals-agent");

        Self {
            watch_dir: PathBuf::from("binData"),
            file_suffix: ".json".to_string(),
            recursive: true,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            backoff: BackoffStrategy::Fixed,
            poll_interval: Duration::from_millis(100),
            dispatch: DispatchPolicy::ThreadPerFile,
            model_path: PathBuf::from("vitals_model.json"),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-vitals-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)?;
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retries == 0 {
            return Err(ConfigError::Invalid("retries must be at least 1".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if let DispatchPolicy::WorkerPool { workers: 0 } = self.dispatch {
            return Err(ConfigError::Invalid(
                "worker_pool needs at least one worker".to_string(),
            ));
        }
        Ok(())
    }

    /// Default JSONL export file inside `export_path`.
    pub fn export_file(&self) -> PathBuf {
        self.export_path.join("predictions.jsonl")
    }

    /// Path of the persisted pipeline statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("pipeline_stats.json")
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for Duration as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.file_suffix, ".json");
        assert!(config.recursive);
        assert_eq!(config.retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.dispatch, DispatchPolicy::ThreadPerFile);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(
            r#"{ "watch_dir": "/radar/binData", "retry_delay": 2, "dispatch": { "mode": "worker_pool", "workers": 8 } }"#,
        )
        .unwrap();
        assert_eq!(config.watch_dir, PathBuf::from("/radar/binData"));
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.dispatch, DispatchPolicy::WorkerPool { workers: 8 });
        assert_eq!(config.retries, 3);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            Config::from_json(r#"{ "retries": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{ "poll_interval": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{ "retries": "three" }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_export_file_lives_in_export_path() {
        let config = Config::from_json(r#"{ "export_path": "/var/lib/vitals/exports" }"#).unwrap();
        assert_eq!(
            config.export_file(),
            PathBuf::from("/var/lib/vitals/exports/predictions.jsonl")
        );
    }

    #[test]
    fn test_export_sink_writes_into_export_path() {
        use crate::output::sink::{JsonlSink, ResultSink};

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_path: dir.path().join("data"),
            export_path: dir.path().join("exports"),
            ..Config::default()
        };
        config.ensure_directories().unwrap();

        let mut sink = JsonlSink::create(config.export_file()).unwrap();
        sink.deliver(&[]).unwrap();
        assert!(config.export_file().is_file());
    }

    #[test]
    fn test_round_trip() {
        let mut config = Config::default();
        config.backoff = BackoffStrategy::Exponential { max_delay_secs: 30 };
        config.poll_interval = Duration::from_millis(250);

        let json = serde_json::to_string(&config).unwrap();
        let parsed = Config::from_json(&json).unwrap();
        assert_eq!(parsed.backoff, config.backoff);
        assert_eq!(parsed.poll_interval, Duration::from_millis(250));
    }
}
