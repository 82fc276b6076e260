//! MigrationSweeper - future set から ready list への定期移送
//!
//! # フロー（1 サイクル）
//! 1. lease lock を取得（取れなければこのサイクルはスキップ。待たない）
//! 2. future set のキーを prefix scan
//! 3. 各キーから対応する ready list のキーを導出
//! 4. score <= now のエントリを取得
//! 5. あれば atomic_transfer で ready list へ移す
//!
//! 失敗したバケットはログに残すだけ。エントリは future set に残るので次のサイクルで再試行されます。
//!
//! lease の更新（heartbeat）はしません。lease より長くかかった sweep は
//! 他インスタンスの sweep と重なる可能性があります（既知の制約）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SchedulerConfig;
use crate::domain::{CacheError, QueueKeys};
use crate::ports::{Clock, DelayCache};

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub buckets_scanned: usize,
    pub tasks_migrated: usize,
    /// Future keys whose migration failed this cycle.
    pub failed_buckets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another instance holds the lease.
    Skipped,
    Completed(SweepReport),
}

pub struct MigrationSweeper {
    cache: Arc<dyn DelayCache>,
    clock: Arc<dyn Clock>,
    keys: QueueKeys,
    lock_name: String,
    lock_ttl: Duration,
    interval: Duration,
}

impl MigrationSweeper {
    pub fn new(cache: Arc<dyn DelayCache>, clock: Arc<dyn Clock>, config: &SchedulerConfig) -> Self {
        Self {
            cache,
            clock,
            keys: config.queue_keys(),
            lock_name: config.lock_name.clone(),
            lock_ttl: config.lock_ttl(),
            interval: config.sweep_interval(),
        }
    }

    /// Runs one cycle if this instance wins the lease.
    pub async fn sweep_once(&self) -> SweepOutcome {
        let token = match self.cache.try_acquire_lock(&self.lock_name, self.lock_ttl).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!(lock = %self.lock_name, "sweep lease held elsewhere, skipping cycle");
                return SweepOutcome::Skipped;
            }
            Err(e) => {
                tracing::warn!(lock = %self.lock_name, error = %e, "sweep lease unavailable, skipping cycle");
                return SweepOutcome::Skipped;
            }
        };

        let started = Instant::now();
        tracing::info!(lock = %token, "sweeping future tasks");

        let mut report = SweepReport::default();
        let future_keys = match self.cache.scan_keys_by_prefix(self.keys.future_prefix()).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "scanning future keys failed");
                return SweepOutcome::Completed(report);
            }
        };

        for future_key in future_keys {
            let Some(ready_key) = self.keys.ready_key_for_future(&future_key) else {
                continue;
            };
            report.buckets_scanned += 1;

            match self.migrate_bucket(&future_key, &ready_key).await {
                Ok(moved) => report.tasks_migrated += moved,
                Err(e) => {
                    tracing::error!(
                        future_key = %future_key,
                        error = %e,
                        "migrating bucket failed, retrying next cycle"
                    );
                    report.failed_buckets.push(future_key);
                }
            }
        }

        let elapsed = started.elapsed();
        if elapsed > self.lock_ttl {
            tracing::warn!(?elapsed, ttl = ?self.lock_ttl, "sweep outlived its lease");
        }
        SweepOutcome::Completed(report)
    }

    async fn migrate_bucket(&self, future_key: &str, ready_key: &str) -> Result<usize, CacheError> {
        let now_ms = self.clock.now_millis();
        let due = self
            .cache
            .sorted_set_range_by_score(future_key, 0, now_ms)
            .await?;
        if due.is_empty() {
            return Ok(0);
        }

        self.cache.atomic_transfer(future_key, ready_key, &due).await?;
        tracing::info!(from = %future_key, to = %ready_key, count = due.len(), "migrated due tasks");
        Ok(due.len())
    }

    /// Fires `sweep_once` at a fixed rate until `shutdown` turns true.
    ///
    /// Every tick runs its cycle on a separate task, so a slow cycle never
    /// delays the next tick.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let sweeper = Arc::clone(&self);
                        tokio::spawn(async move {
                            sweeper.sweep_once().await;
                        });
                    }
                }
            }
            tracing::debug!("sweeper stopped");
        })
    }
}
