//! Runtime configuration, loaded from TOML.
//!
//! ```toml
//! [scheduler]
//! horizon_secs = 300
//! sweep_interval_secs = 60
//! lock_name = "FUTURE_TASK_SYNC"
//! lock_ttl_ms = 30000
//! ready_prefix = "topic:"
//! future_prefix = "future:"
//!
//! [consumer]
//! poll_interval_ms = 1000
//! ```
//!
//! Every field is optional; omitted ones take the values above.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::domain::QueueKeys;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub consumer: ConsumerConfig,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if self.consumer.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "consumer.poll_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Lookahead window for placing not-yet-due tasks in the future set.
    pub horizon_secs: u64,
    pub sweep_interval_secs: u64,
    pub lock_name: String,
    pub lock_ttl_ms: u64,
    pub ready_prefix: String,
    pub future_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon_secs: 300,
            sweep_interval_secs: 60,
            lock_name: "FUTURE_TASK_SYNC".to_string(),
            lock_ttl_ms: 30_000,
            ready_prefix: "topic:".to_string(),
            future_prefix: "future:".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn horizon(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.horizon_secs).unwrap_or(i64::MAX))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn queue_keys(&self) -> QueueKeys {
        QueueKeys::new(self.ready_prefix.clone(), self.future_prefix.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.lock_ttl_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.lock_ttl_ms must be > 0".into(),
            ));
        }
        if self.lock_name.is_empty() {
            return Err(ConfigError::Invalid("scheduler.lock_name is empty".into()));
        }
        if self.ready_prefix.is_empty() || self.future_prefix.is_empty() {
            return Err(ConfigError::Invalid("key prefixes must not be empty".into()));
        }
        // a scan of one namespace must never return keys of the other
        if self.ready_prefix.starts_with(&self.future_prefix)
            || self.future_prefix.starts_with(&self.ready_prefix)
        {
            return Err(ConfigError::Invalid(format!(
                "prefixes overlap: {:?} / {:?}",
                self.ready_prefix, self.future_prefix
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub poll_interval_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
        }
    }
}

impl ConsumerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
