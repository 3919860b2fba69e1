//! Configuration management for the anchoring engine
//!
//! This module handles loading, validating, and providing access to the
//! engine configuration. It supports loading configuration from a TOML file,
//! environment variables, and programmatic overrides.

mod error;

use std::{env, fmt, fs, path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Re-export the error type
pub use error::ConfigError;

/// The environment variable prefix for configuration overrides
const ENV_PREFIX: &str = "ANCHOR_";

/// Main configuration structure for the anchoring engine.
///
/// This struct holds all configuration options. It can be loaded from a TOML
/// file, environment variables, or created programmatically.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Batch cutting configuration
    pub batch: BatchConfig,

    /// Chain submission and retry configuration
    pub submission: SubmissionConfig,

    /// Anchor store configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Batch cutting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BatchConfig {
    /// Maximum number of transactions per anchor; reaching this queue length
    /// triggers an immediate cut without waiting for the timer
    pub max_batch_size: usize,
    /// Minimum queue length required for a timer-driven cut
    pub min_batch_size: usize,
    /// Scheduler tick interval in seconds
    pub interval_seconds: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            min_batch_size: 1,
            interval_seconds: 600,
        }
    }
}

impl BatchConfig {
    /// Scheduler tick interval as a [Duration].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Chain submission and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SubmissionConfig {
    /// Maximum submission attempts per anchoring round
    pub max_attempts: u32,
    /// Fixed delay between attempts, in seconds
    pub retry_delay_seconds: u64,
    /// Per-attempt timeout for the chain client, in seconds
    pub submit_timeout_seconds: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_seconds: 5,
            submit_timeout_seconds: 30,
        }
    }
}

impl SubmissionConfig {
    /// Delay between attempts as a [Duration].
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    /// Per-attempt timeout as a [Duration].
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_seconds)
    }

    /// Upper bound on how long one anchoring round can hold the cut lock.
    pub fn worst_case_round(&self) -> Duration {
        (self.submit_timeout() + self.retry_delay()) * self.max_attempts
    }
}

/// Anchor store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Keep anchor records in memory only
    Memory,
    /// Persist anchor records to a JSON state file
    File,
}

/// Anchor store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    /// Storage type
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Base path for file storage (ignored for memory storage)
    pub base_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            base_path: "./data".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Whether to log to console
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: true,
        }
    }
}

/// Logging level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// A level lower than all other levels
    Off,
    /// Corresponds to the `ERROR` log level
    Error,
    /// Corresponds to the `WARN` log level
    Warn,
    /// Corresponds to the `INFO` log level
    Info,
    /// Corresponds to the `DEBUG` log level
    Debug,
    /// Corresponds to the `TRACE` log level
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl Config {
    /// Loads the configuration from the specified path.
    ///
    /// If the file does not exist, built-in defaults are used. Environment
    /// variables with the `ANCHOR_` prefix override values from either source,
    /// and the result is validated before being returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or
    /// parsed, or if the resulting configuration fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let mut config = match fs::read_to_string(path) {
            Ok(config_str) => toml::from_str(&config_str)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Config file not found at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                return Err(ConfigError::file_not_found(format!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        config.apply_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    ///
    /// Environment variables are prefixed with `ANCHOR_` and use `_` as a
    /// separator, e.g. `ANCHOR_BATCH_MAX_BATCH_SIZE=50` or
    /// `ANCHOR_LOGGING_LEVEL=debug`.
    ///
    /// # Errors
    ///
    /// Returns an error if an override value cannot be parsed.
    pub fn apply_env_vars(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }

            match stripped.to_lowercase().as_str() {
                "batch_max_batch_size" => {
                    self.batch.max_batch_size = value.parse().map_err(|_| {
                        ConfigError::invalid_value("batch.max_batch_size", &value, "expected an integer")
                    })?;
                }
                "batch_min_batch_size" => {
                    self.batch.min_batch_size = value.parse().map_err(|_| {
                        ConfigError::invalid_value("batch.min_batch_size", &value, "expected an integer")
                    })?;
                }
                "batch_interval_seconds" => {
                    self.batch.interval_seconds = value.parse().map_err(|_| {
                        ConfigError::invalid_value("batch.interval_seconds", &value, "expected an integer")
                    })?;
                }
                "submission_max_attempts" => {
                    self.submission.max_attempts = value.parse().map_err(|_| {
                        ConfigError::invalid_value("submission.max_attempts", &value, "expected an integer")
                    })?;
                }
                "submission_retry_delay_seconds" => {
                    self.submission.retry_delay_seconds = value.parse().map_err(|_| {
                        ConfigError::invalid_value(
                            "submission.retry_delay_seconds",
                            &value,
                            "expected an integer",
                        )
                    })?;
                }
                "submission_submit_timeout_seconds" => {
                    self.submission.submit_timeout_seconds = value.parse().map_err(|_| {
                        ConfigError::invalid_value(
                            "submission.submit_timeout_seconds",
                            &value,
                            "expected an integer",
                        )
                    })?;
                }
                "logging_level" => {
                    self.logging.level = value.parse().map_err(|_| {
                        ConfigError::invalid_value("logging.level", &value, "Invalid log level")
                    })?;
                }
                "storage_base_path" => {
                    self.storage.base_path = value;
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.max_batch_size == 0 {
            return Err(ConfigError::invalid_value(
                "batch.max_batch_size",
                self.batch.max_batch_size,
                "must be at least 1",
            ));
        }
        if self.batch.min_batch_size == 0 {
            return Err(ConfigError::invalid_value(
                "batch.min_batch_size",
                self.batch.min_batch_size,
                "must be at least 1",
            ));
        }
        if self.batch.min_batch_size > self.batch.max_batch_size {
            return Err(ConfigError::invalid_value(
                "batch.min_batch_size",
                self.batch.min_batch_size,
                "must not exceed batch.max_batch_size",
            ));
        }
        if self.batch.interval_seconds == 0 {
            return Err(ConfigError::invalid_value(
                "batch.interval_seconds",
                self.batch.interval_seconds,
                "must be at least 1",
            ));
        }
        if self.submission.max_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "submission.max_attempts",
                self.submission.max_attempts,
                "must be at least 1",
            ));
        }
        if self.submission.submit_timeout_seconds == 0 {
            return Err(ConfigError::invalid_value(
                "submission.submit_timeout_seconds",
                self.submission.submit_timeout_seconds,
                "must be at least 1",
            ));
        }
        if self.storage.storage_type == StorageType::File && self.storage.base_path.is_empty() {
            return Err(ConfigError::missing_value("storage.base_path"));
        }

        // A retry round that outlasts the batch interval delays every
        // subsequent cut behind a struggling submission.
        if self.submission.worst_case_round() > self.batch.interval() {
            log::warn!(
                "submission retry window ({}s worst case) exceeds the batch interval ({}s); \
                 slow submissions will delay batch cuts",
                self.submission.worst_case_round().as_secs(),
                self.batch.interval_seconds
            );
        }

        Ok(())
    }
}
