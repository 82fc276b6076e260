//! ScheduleClient - 呼び出し側から見た唯一の入口

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::scheduler::Scheduler;
use crate::domain::{Bucket, NewTask, SchedulerError, Task, TaskId};
use crate::typed::{PayloadCodec, TaskKind};

#[derive(Clone)]
pub struct ScheduleClient {
    scheduler: Arc<Scheduler>,
}

impl ScheduleClient {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    pub async fn add_task(&self, new_task: NewTask) -> Result<TaskId, SchedulerError> {
        self.scheduler.add_task(new_task).await
    }

    /// Schedules on a separate task; the caller does not wait for placement.
    pub fn add_task_detached(
        &self,
        new_task: NewTask,
    ) -> JoinHandle<Result<TaskId, SchedulerError>> {
        let scheduler = Arc::clone(&self.scheduler);
        tokio::spawn(async move { scheduler.add_task(new_task).await })
    }

    pub async fn cancel_task(&self, task_id: TaskId) -> bool {
        self.scheduler.cancel_task(task_id).await
    }

    pub async fn poll(&self, bucket: Bucket) -> Result<Option<Task>, SchedulerError> {
        self.scheduler.poll(bucket).await
    }

    pub async fn schedule<T: TaskKind>(
        &self,
        payload: &T,
        at: DateTime<Utc>,
    ) -> Result<TaskId, SchedulerError> {
        let new_task = PayloadCodec::new_task(payload, at)?;
        self.add_task(new_task).await
    }

    /// Polls `T`'s bucket and decodes the payload.
    ///
    /// A popped task whose payload does not decode is already consumed; the
    /// error is returned so the caller can log it.
    pub async fn poll_typed<T: TaskKind>(&self) -> Result<Option<(TaskId, T)>, SchedulerError> {
        let Some(task) = self.poll(T::bucket()).await? else {
            return Ok(None);
        };
        let payload = PayloadCodec::decode(&task.parameters)?;
        Ok(Some((task.task_id, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::scheduler::tests::Harness;
    use crate::domain::{CodecError, TaskStatus};
    use crate::typed::task::fixtures::{ArticleReview, CacheWarmup};

    fn review(article_id: u64) -> ArticleReview {
        ArticleReview {
            article_id,
            reviewer: "sora".into(),
        }
    }

    #[tokio::test]
    async fn typed_round_trip_through_the_ready_list() {
        let h = Harness::new();
        let client = ScheduleClient::new(h.scheduler.clone());

        let id = client.schedule(&review(1), h.at(0)).await.unwrap();
        let (polled, payload) = client.poll_typed::<ArticleReview>().await.unwrap().unwrap();

        assert_eq!(polled, id);
        assert_eq!(payload, review(1));
        assert!(client.poll_typed::<ArticleReview>().await.unwrap().is_none());
        assert!(client.poll_typed::<CacheWarmup>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn detached_add_completes_on_its_own() {
        let h = Harness::new();
        let client = ScheduleClient::new(h.scheduler.clone());
        let new_task = PayloadCodec::new_task(&review(2), h.at(60_000)).unwrap();

        let id = client.add_task_detached(new_task).await.unwrap().unwrap();
        assert_eq!(h.status(id).await, TaskStatus::Scheduled);
        assert_eq!(h.store.record_count().await, 1);

        assert!(client.cancel_task(id).await);
        assert_eq!(h.status(id).await, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn foreign_payload_in_a_typed_bucket_is_a_codec_error() {
        let h = Harness::new();
        let client = ScheduleClient::new(h.scheduler.clone());
        client
            .add_task(NewTask::new(ArticleReview::bucket(), h.at(0), b"{}".to_vec()))
            .await
            .unwrap();

        let err = client.poll_typed::<ArticleReview>().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Codec(CodecError::Decode(_))));
        // consumed either way
        assert!(client.poll(ArticleReview::bucket()).await.unwrap().is_none());
    }
}
