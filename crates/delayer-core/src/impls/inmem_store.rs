//! InMemoryTaskStore - テスト用の正本

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::domain::{NewTask, StoreError, Task, TaskId, TaskLog, TaskRecord};
use crate::ports::{Clock, IdGenerator, TaskStore, UlidGenerator};

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<TaskId, TaskRecord>,
    logs: HashMap<TaskId, TaskLog>,
}

/// [`TaskStore`] over two hash maps.
///
/// `fail_writes(true)` makes every write return a backend error, which is how
/// tests exercise the persistence-failure path.
pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
    ids: UlidGenerator<Arc<dyn Clock>>,
    failing: AtomicBool,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            ids: UlidGenerator::new(clock),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".to_string()));
        }
        Ok(())
    }

    pub async fn record_count(&self) -> usize {
        self.state.lock().await.records.len()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn next_task_id(&self) -> TaskId {
        self.ids.generate_task_id()
    }

    async fn insert_record(&self, task: &Task) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        state.records.insert(task.task_id, TaskRecord::from(task));
        Ok(())
    }

    async fn delete_record(&self, task_id: TaskId) -> Result<(), StoreError> {
        self.check_writable()?;
        self.state.lock().await.records.remove(&task_id);
        Ok(())
    }

    async fn get_record(&self, task_id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.state.lock().await.records.get(&task_id).cloned())
    }

    async fn insert_log(&self, log: &TaskLog) -> Result<(), StoreError> {
        self.check_writable()?;
        self.state.lock().await.logs.insert(log.task_id, log.clone());
        Ok(())
    }

    async fn get_log(&self, task_id: TaskId) -> Result<TaskLog, StoreError> {
        self.state
            .lock()
            .await
            .logs
            .get(&task_id)
            .cloned()
            .ok_or(StoreError::NotFound(task_id))
    }

    async fn update_log(&self, log: &TaskLog) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let stored = state
            .logs
            .get_mut(&log.task_id)
            .ok_or(StoreError::NotFound(log.task_id))?;
        if stored.version + 1 != log.version {
            return Err(StoreError::VersionConflict {
                task_id: log.task_id,
                expected: log.version.saturating_sub(1),
                found: stored.version,
            });
        }
        *stored = log.clone();
        Ok(())
    }

    /// Record and log are written under one lock acquisition.
    async fn create(&self, new_task: &NewTask) -> Result<Task, StoreError> {
        self.check_writable()?;
        let task = new_task.clone().with_id(self.next_task_id());
        let mut state = self.state.lock().await;
        state.records.insert(task.task_id, TaskRecord::from(&task));
        state.logs.insert(task.task_id, TaskLog::scheduled(&task));
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bucket, TaskStatus};
    use crate::ports::SystemClock;
    use chrono::Utc;

    fn store() -> InMemoryTaskStore {
        InMemoryTaskStore::new(Arc::new(SystemClock))
    }

    fn new_task() -> NewTask {
        NewTask::new(Bucket::new(100, 50), Utc::now(), b"payload".to_vec())
    }

    #[tokio::test]
    async fn create_writes_record_and_scheduled_log() {
        let store = store();
        let task = store.create(&new_task()).await.unwrap();

        let record = store.get_record(task.task_id).await.unwrap().unwrap();
        assert_eq!(record, TaskRecord::from(&task));

        let log = store.get_log(task.task_id).await.unwrap();
        assert_eq!(log.status, TaskStatus::Scheduled);
        assert_eq!(log.version, 1);
    }

    #[tokio::test]
    async fn update_log_is_optimistic() {
        let store = store();
        let task = store.create(&new_task()).await.unwrap();
        let log = store.get_log(task.task_id).await.unwrap();

        store
            .update_log(&log.transition(TaskStatus::Executed))
            .await
            .unwrap();

        // a second writer holding the stale version loses
        let err = store
            .update_log(&log.transition(TaskStatus::Cancelled))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 1,
                found: 2,
                ..
            }
        ));
        assert_eq!(
            store.get_log(task.task_id).await.unwrap().status,
            TaskStatus::Executed
        );
    }

    #[tokio::test]
    async fn log_survives_record_deletion() {
        let store = store();
        let task = store.create(&new_task()).await.unwrap();

        store.delete_record(task.task_id).await.unwrap();
        store.delete_record(task.task_id).await.unwrap();

        assert!(store.get_record(task.task_id).await.unwrap().is_none());
        assert!(store.get_log(task.task_id).await.is_ok());
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn failing_writes_surface_backend_errors() {
        let store = store();
        store.fail_writes(true);
        assert!(matches!(
            store.create(&new_task()).await,
            Err(StoreError::Backend(_))
        ));
        assert_eq!(store.record_count().await, 0);
    }
}
