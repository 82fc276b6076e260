//! ConsumerGroup - 登録済みバケットごとの poll ループ
//!
//! - バケット 1 つにつき tokio task 1 つ
//! - tick ごとに ready list を空になるまで poll し、Handler に渡す
//! - Handler / poll のエラーはログに残すだけでループは止めない
//! - `shutdown_tx` で停止を要求（実行中の Handler はキャンセルしない）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::client::ScheduleClient;
use crate::domain::Bucket;
use crate::typed::{DynHandler, TypedRegistry};

/// Consumer group handle.
pub struct ConsumerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ConsumerGroup {
    /// Spawns one consumer per registered bucket.
    pub fn spawn(client: ScheduleClient, registry: &TypedRegistry, poll_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::new();
        for bucket in registry.buckets() {
            let Some(handler) = registry.get(bucket) else {
                continue;
            };
            let client = client.clone();
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                consumer_loop(bucket, handler, client, poll_interval, &mut rx).await;
            }));
        }
        tracing::info!(consumers = joins.len(), "consumer group started");

        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "consumer task panicked");
            }
        }
    }
}

#[tracing::instrument(skip_all, fields(bucket = %bucket))]
async fn consumer_loop(
    bucket: Bucket,
    handler: Arc<dyn DynHandler>,
    client: ScheduleClient,
    poll_interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    'consume: loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        // drain what is ready now
        loop {
            if *shutdown_rx.borrow() {
                break 'consume;
            }
            let task = match client.poll(bucket).await {
                Ok(Some(task)) => task,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "poll failed");
                    break;
                }
            };

            let task_id = task.task_id;
            match handler.handle_dyn(task).await {
                Ok(()) => tracing::debug!(%task_id, "task handled"),
                Err(e) => tracing::error!(%task_id, error = %e, "handler failed"),
            }
        }
    }
    tracing::debug!("consumer stopped");
}
