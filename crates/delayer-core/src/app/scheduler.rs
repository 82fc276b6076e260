//! Scheduler - 追加・キャンセル・取得
//!
//! タスクがどこに置かれるべきかという業務ルールを持つ唯一のコンポーネントです。
//!
//! # 配置ルール（add_task）
//! - `execute_time <= now` → ready list（即時に poll 可能）
//! - `now < execute_time <= now + horizon` → future set（sweep で ready へ）
//! - それ以外 → TaskStore にのみ保存（cache には置かない）
//!
//! TaskStore への書き込みと cache への配置は同一トランザクションではありません。

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::domain::{
    Bucket, NewTask, QueueKeys, SchedulerError, StoreError, Task, TaskId, TaskStatus,
};
use crate::ports::{Clock, DelayCache, TaskStore};

/// Where a task goes at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Ready list: consumable now.
    Ready,
    /// Future set: promoted by the sweeper once due.
    Future,
    /// Beyond the horizon: persisted only, never placed by admission.
    Deferred,
}

impl Placement {
    pub fn decide(
        execute_time: DateTime<Utc>,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
    ) -> Self {
        if execute_time <= now {
            Placement::Ready
        } else if execute_time <= now + horizon {
            Placement::Future
        } else {
            Placement::Deferred
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    cache: Arc<dyn DelayCache>,
    clock: Arc<dyn Clock>,
    keys: QueueKeys,
    horizon: chrono::Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        cache: Arc<dyn DelayCache>,
        clock: Arc<dyn Clock>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            keys: config.queue_keys(),
            horizon: config.horizon(),
        }
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    /// Persists the task, then places it according to its due time.
    ///
    /// A persistence failure is returned and nothing is placed. A placement
    /// failure after a successful write is only logged: the id is returned and
    /// the task stays persisted without a cache entry.
    #[tracing::instrument(skip_all, fields(bucket = %new_task.bucket()))]
    pub async fn add_task(&self, new_task: NewTask) -> Result<TaskId, SchedulerError> {
        let task = match self.store.create(&new_task).await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(error = %e, "persisting task failed, nothing placed");
                return Err(e.into());
            }
        };

        match self.place(&task).await {
            Ok(placement) => {
                tracing::info!(task_id = %task.task_id, ?placement, "task admitted");
            }
            Err(e) => {
                tracing::error!(
                    task_id = %task.task_id,
                    error = %e,
                    "cache placement failed, task is persisted only"
                );
            }
        }
        Ok(task.task_id)
    }

    async fn place(&self, task: &Task) -> Result<Placement, SchedulerError> {
        let placement = Placement::decide(task.execute_time, self.clock.now(), self.horizon);
        let bucket = task.bucket();
        match placement {
            Placement::Ready => {
                self.cache
                    .list_push_front(&self.keys.ready_key(bucket), &task.to_json()?)
                    .await?;
            }
            Placement::Future => {
                self.cache
                    .sorted_set_add(&self.keys.future_key(bucket), &task.to_json()?, task.score())
                    .await?;
            }
            Placement::Deferred => {
                tracing::debug!(
                    task_id = %task.task_id,
                    execute_time = %task.execute_time,
                    "beyond horizon, not placed in cache"
                );
            }
        }
        Ok(placement)
    }

    /// Cancels a scheduled task.
    ///
    /// `false` when the task store transition fails: unknown id, task already
    /// executed or cancelled, lost a concurrent update, or backend error.
    /// A task already missing from the cache is not a failure.
    #[tracing::instrument(skip_all, fields(task_id = %task_id))]
    pub async fn cancel_task(&self, task_id: TaskId) -> bool {
        let task = match self.finish(task_id, TaskStatus::Cancelled).await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(error = %e, kind = ?e.kind(), "task cancel failed");
                return false;
            }
        };

        if let Err(e) = self.remove_from_cache(&task).await {
            tracing::warn!(error = %e, "task cancelled but cache removal failed");
        }
        true
    }

    /// Removes the serialized task by value. A due task is taken out of both
    /// structures since it may still be waiting in the future set for a sweep.
    async fn remove_from_cache(&self, task: &Task) -> Result<(), SchedulerError> {
        let json = task.to_json()?;
        let bucket = task.bucket();
        if task.execute_time <= self.clock.now() {
            self.cache
                .list_remove_value(&self.keys.ready_key(bucket), 0, &json)
                .await?;
        }
        self.cache
            .sorted_set_remove_value(&self.keys.future_key(bucket), &json)
            .await?;
        Ok(())
    }

    /// Pops the oldest ready task of the bucket.
    ///
    /// `Ok(None)` is the normal idle result. Malformed entries and entries
    /// whose task was cancelled concurrently are dropped and also yield
    /// `Ok(None)`, so one bad entry never blocks the bucket.
    #[tracing::instrument(skip_all, fields(bucket = %bucket))]
    pub async fn poll(&self, bucket: Bucket) -> Result<Option<Task>, SchedulerError> {
        let Some(json) = self.cache.list_pop_back(&self.keys.ready_key(bucket)).await? else {
            return Ok(None);
        };

        let task = match Task::from_json(&json) {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(error = %e, payload = %json, "dropping malformed ready entry");
                return Ok(None);
            }
        };

        match self.finish(task.task_id, TaskStatus::Executed).await {
            Ok(_) => {
                tracing::debug!(task_id = %task.task_id, "task polled");
                Ok(Some(task))
            }
            Err(e) if e.is_gone() || is_version_conflict(&e) => {
                tracing::info!(
                    task_id = %task.task_id,
                    error = %e,
                    "popped task no longer scheduled, dropping"
                );
                Ok(None)
            }
            Err(e) => {
                // already popped, so deliver rather than lose it
                tracing::error!(task_id = %task.task_id, error = %e, "marking task executed failed");
                Ok(Some(task))
            }
        }
    }

    /// SCHEDULED -> `status`: delete the record, bump the log version.
    async fn finish(&self, task_id: TaskId, status: TaskStatus) -> Result<Task, SchedulerError> {
        let log = self.store.get_log(task_id).await?;
        if log.status.is_terminal() {
            return Err(SchedulerError::NotScheduled {
                task_id,
                status: log.status,
            });
        }
        self.store.delete_record(task_id).await?;
        self.store.update_log(&log.transition(status)).await?;
        Ok(log.to_task())
    }
}

fn is_version_conflict(e: &SchedulerError) -> bool {
    matches!(e, SchedulerError::Store(StoreError::VersionConflict { .. }))
}
