//! FlakyCache - 障害注入用の DelayCache（テスト専用）

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::inmem_cache::InMemoryDelayCache;
use crate::domain::{CacheError, LockToken};
use crate::ports::{Clock, DelayCache};

/// Delegates to an [`InMemoryDelayCache`]; each switch makes one family of
/// writes fail. Lease attempts are counted.
pub(crate) struct FlakyCache {
    pub inner: InMemoryDelayCache,
    pub lock_attempts: AtomicUsize,
    pub fail_pushes: AtomicBool,
    pub fail_adds: AtomicBool,
    pub fail_removes: AtomicBool,
    pub fail_transfers: AtomicBool,
}

impl FlakyCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: InMemoryDelayCache::new(clock),
            lock_attempts: AtomicUsize::new(0),
            fail_pushes: AtomicBool::new(false),
            fail_adds: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            fail_transfers: AtomicBool::new(false),
        }
    }
}

fn check(switch: &AtomicBool, op: &str) -> Result<(), CacheError> {
    if switch.load(Ordering::SeqCst) {
        return Err(CacheError::Backend(format!("{op} refused")));
    }
    Ok(())
}

#[async_trait]
impl DelayCache for FlakyCache {
    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), CacheError> {
        check(&self.fail_pushes, "lpush")?;
        self.inner.list_push_front(key, value).await
    }

    async fn list_pop_back(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.list_pop_back(key).await
    }

    async fn list_remove_value(
        &self,
        key: &str,
        count: usize,
        value: &str,
    ) -> Result<usize, CacheError> {
        check(&self.fail_removes, "lrem")?;
        self.inner.list_remove_value(key, count, value).await
    }

    async fn sorted_set_add(&self, key: &str, value: &str, score: i64) -> Result<(), CacheError> {
        check(&self.fail_adds, "zadd")?;
        self.inner.sorted_set_add(key, value, score).await
    }

    async fn sorted_set_remove_value(&self, key: &str, value: &str) -> Result<bool, CacheError> {
        check(&self.fail_removes, "zrem")?;
        self.inner.sorted_set_remove_value(key, value).await
    }

    async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<String>, CacheError> {
        self.inner.sorted_set_range_by_score(key, min, max).await
    }

    async fn scan_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.inner.scan_keys_by_prefix(prefix).await
    }

    async fn try_acquire_lock(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, CacheError> {
        self.lock_attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.try_acquire_lock(name, ttl).await
    }

    async fn atomic_transfer(
        &self,
        future_key: &str,
        ready_key: &str,
        values: &[String],
    ) -> Result<(), CacheError> {
        check(&self.fail_transfers, "transfer")?;
        self.inner.atomic_transfer(future_key, ready_key, values).await
    }
}
