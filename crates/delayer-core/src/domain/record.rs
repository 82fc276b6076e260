//! Task store rows: the live record and its audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Task, TaskId};

/// Lifecycle status kept in the task log.
///
/// State transitions:
/// - Scheduled -> Executed (consumed by `poll`)
/// - Scheduled -> Cancelled (`cancel_task`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Scheduled,
    Executed,
    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Executed | TaskStatus::Cancelled)
    }

    /// Integer code used by the SQL backend.
    pub fn code(self) -> i64 {
        match self {
            TaskStatus::Scheduled => 0,
            TaskStatus::Executed => 1,
            TaskStatus::Cancelled => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TaskStatus::Scheduled),
            1 => Some(TaskStatus::Executed),
            2 => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Scheduled => "SCHEDULED",
            TaskStatus::Executed => "EXECUTED",
            TaskStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// One row per live task. Deleted, not archived, when the task terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub task_type: i32,
    pub priority: i32,
    pub execute_time: DateTime<Utc>,
    pub parameters: Vec<u8>,
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id,
            task_type: task.task_type,
            priority: task.priority,
            execute_time: task.execute_time,
            parameters: task.parameters.clone(),
        }
    }
}

/// Audit trail entry keyed by task id. Survives record deletion.
///
/// `version` starts at 1 and is bumped on every mutation; the store rejects
/// an update whose version does not follow the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLog {
    pub task_id: TaskId,
    pub task_type: i32,
    pub priority: i32,
    pub execute_time: DateTime<Utc>,
    pub parameters: Vec<u8>,
    pub status: TaskStatus,
    pub version: u32,
}

impl TaskLog {
    /// Initial log for a freshly admitted task.
    pub fn scheduled(task: &Task) -> Self {
        Self {
            task_id: task.task_id,
            task_type: task.task_type,
            priority: task.priority,
            execute_time: task.execute_time,
            parameters: task.parameters.clone(),
            status: TaskStatus::Scheduled,
            version: 1,
        }
    }

    /// Next version of this log with a new status.
    pub fn transition(&self, status: TaskStatus) -> Self {
        Self {
            status,
            version: self.version + 1,
            ..self.clone()
        }
    }

    /// The task as it was placed in the cache.
    pub fn to_task(&self) -> Task {
        Task {
            task_id: self.task_id,
            task_type: self.task_type,
            priority: self.priority,
            execute_time: self.execute_time,
            parameters: self.parameters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bucket, NewTask};
    use rstest::rstest;
    use ulid::Ulid;

    fn sample_task() -> Task {
        NewTask::new(Bucket::new(100, 50), Utc::now(), vec![1, 2, 3])
            .with_id(TaskId::from_ulid(Ulid::new()))
    }

    #[rstest]
    #[case(TaskStatus::Scheduled, false)]
    #[case(TaskStatus::Executed, true)]
    #[case(TaskStatus::Cancelled, true)]
    fn terminal_states(#[case] status: TaskStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(TaskStatus::from_code(status.code()), Some(status));
    }

    #[test]
    fn transition_bumps_version_and_keeps_payload() {
        let task = sample_task();
        let log = TaskLog::scheduled(&task);
        assert_eq!(log.version, 1);
        assert_eq!(log.status, TaskStatus::Scheduled);

        let cancelled = log.transition(TaskStatus::Cancelled);
        assert_eq!(cancelled.version, 2);
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert_eq!(cancelled.to_task(), task);
    }

    #[test]
    fn record_mirrors_task() {
        let task = sample_task();
        let record = TaskRecord::from(&task);
        assert_eq!(record.task_id, task.task_id);
        assert_eq!(record.parameters, task.parameters);
    }
}
