//! Task data carried end to end, and the `{type}_{priority}` bucket it lives in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::TaskId;
use super::errors::CodecError;

/// A `{task_type}_{priority}` pair. Every cache structure is keyed by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bucket {
    pub task_type: i32,
    pub priority: i32,
}

impl Bucket {
    pub const fn new(task_type: i32, priority: i32) -> Self {
        Self {
            task_type,
            priority,
        }
    }

    /// Key suffix shared by the ready list and the future set.
    pub fn suffix(&self) -> String {
        format!("{}_{}", self.task_type, self.priority)
    }

    /// Inverse of [`Bucket::suffix`].
    pub fn parse_suffix(suffix: &str) -> Option<Self> {
        let (task_type, priority) = suffix.split_once('_')?;
        Some(Self::new(task_type.parse().ok()?, priority.parse().ok()?))
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.task_type, self.priority)
    }
}

/// Derives cache keys from buckets.
///
/// The ready list and future set of one bucket share the suffix and differ
/// only in the namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    ready_prefix: String,
    future_prefix: String,
}

impl QueueKeys {
    pub fn new(ready_prefix: impl Into<String>, future_prefix: impl Into<String>) -> Self {
        Self {
            ready_prefix: ready_prefix.into(),
            future_prefix: future_prefix.into(),
        }
    }

    pub fn ready_prefix(&self) -> &str {
        &self.ready_prefix
    }

    pub fn future_prefix(&self) -> &str {
        &self.future_prefix
    }

    pub fn ready_key(&self, bucket: Bucket) -> String {
        format!("{}{}", self.ready_prefix, bucket.suffix())
    }

    pub fn future_key(&self, bucket: Bucket) -> String {
        format!("{}{}", self.future_prefix, bucket.suffix())
    }

    /// `future:100_50` -> `topic:100_50`. `None` if the key is not a future key.
    pub fn ready_key_for_future(&self, future_key: &str) -> Option<String> {
        future_key
            .strip_prefix(&self.future_prefix)
            .map(|suffix| format!("{}{}", self.ready_prefix, suffix))
    }
}

impl Default for QueueKeys {
    fn default() -> Self {
        Self::new("topic:", "future:")
    }
}

/// Admission input. The id is assigned by the task store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub task_type: i32,
    pub priority: i32,
    pub execute_time: DateTime<Utc>,
    pub parameters: Vec<u8>,
}

impl NewTask {
    /// `execute_time` is truncated to millisecond resolution, the resolution
    /// used for cache scores and serialization.
    pub fn new(bucket: Bucket, execute_time: DateTime<Utc>, parameters: Vec<u8>) -> Self {
        Self {
            task_type: bucket.task_type,
            priority: bucket.priority,
            execute_time: truncate_to_millis(execute_time),
            parameters,
        }
    }

    pub fn bucket(&self) -> Bucket {
        Bucket::new(self.task_type, self.priority)
    }

    pub fn with_id(self, task_id: TaskId) -> Task {
        Task {
            task_id,
            task_type: self.task_type,
            priority: self.priority,
            execute_time: truncate_to_millis(self.execute_time),
            parameters: self.parameters,
        }
    }
}

/// A persisted task, as placed in the cache and handed to consumers.
///
/// The JSON form is what the cache stores. Field order is fixed, so a task
/// rebuilt from its log serializes to exactly the bytes placed at admission;
/// value-match removal depends on that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub task_type: i32,
    pub priority: i32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub execute_time: DateTime<Utc>,
    pub parameters: Vec<u8>,
}

impl Task {
    pub fn bucket(&self) -> Bucket {
        Bucket::new(self.task_type, self.priority)
    }

    /// Score used in the future set.
    pub fn score(&self) -> i64 {
        self.execute_time.timestamp_millis()
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }

    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        serde_json::from_str(json).map_err(CodecError::Decode)
    }
}

pub(crate) fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}
