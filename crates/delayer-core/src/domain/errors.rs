//! Errors - エラー型と分類
//!
//! 各 port ごとにエラー型を持ち、Scheduler で `SchedulerError` に集約します。

use thiserror::Error;

use super::{TaskId, TaskStatus};

/// ErrorKind は実行エラーの運用分類
///
/// - Transient: 一時的なエラー（次のサイクルで解消しうる）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（store / cache の障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no task log for {0}")]
    NotFound(TaskId),

    #[error("version conflict on {task_id}: expected {expected}, found {found}")]
    VersionConflict {
        task_id: TaskId,
        expected: u32,
        found: u32,
    },

    #[error("task store backend: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("delay cache backend: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("{task_id} is {status}, not SCHEDULED")]
    NotScheduled { task_id: TaskId, status: TaskStatus },
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::Store(StoreError::Backend(_)) | SchedulerError::Cache(_) => {
                ErrorKind::Infrastructure
            }
            SchedulerError::Store(StoreError::VersionConflict { .. }) => ErrorKind::Transient,
            SchedulerError::Store(StoreError::NotFound(_))
            | SchedulerError::Codec(_)
            | SchedulerError::NotScheduled { .. } => ErrorKind::Permanent,
        }
    }

    /// The task already left the SCHEDULED state (or never existed).
    pub fn is_gone(&self) -> bool {
        matches!(
            self,
            SchedulerError::Store(StoreError::NotFound(_)) | SchedulerError::NotScheduled { .. }
        )
    }
}
