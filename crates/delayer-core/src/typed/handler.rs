//! Handler trait - ポーリングしたタスクを処理する Handler の定義
//!
//! - `Handler<T>`: 型付き（表層）
//! - `DynHandler`: object-safe（内部）。`TypedHandler<T, H>` で型消去する

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

use super::codec::PayloadCodec;
use super::task::TaskKind;
use crate::domain::{Bucket, Task, TaskId};

/// Handles one decoded payload.
///
/// `Handler<ArticleReview>` only ever receives `ArticleReview`; the bucket to
/// handler mapping is fixed at compile time.
#[async_trait]
pub trait Handler<T: TaskKind>: Send + Sync {
    async fn handle(&self, task_id: TaskId, payload: T) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: TaskKind, H: Handler<T> + ?Sized> Handler<T> for Arc<H> {
    async fn handle(&self, task_id: TaskId, payload: T) -> anyhow::Result<()> {
        (**self).handle(task_id, payload).await
    }
}

#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, task: Task) -> anyhow::Result<()>;
    fn bucket(&self) -> Bucket;
}

pub struct TypedHandler<T: TaskKind, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TaskKind, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TaskKind, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, task: Task) -> anyhow::Result<()> {
        let payload: T = PayloadCodec::decode(&task.parameters)?;
        self.handler.handle(task.task_id, payload).await
    }

    fn bucket(&self) -> Bucket {
        T::bucket()
    }
}
