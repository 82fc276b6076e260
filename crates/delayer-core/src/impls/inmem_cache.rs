//! InMemoryDelayCache - 開発用・テスト用の共有キャッシュ
//!
//! # 実装詳細
//! - list / sorted set / lease を 1 つの `tokio::sync::Mutex` で保護
//!   （各プリミティブと `atomic_transfer` がアトミックになる）
//! - lease の期限は注入された Clock で判定
//! - 同じ `Arc<InMemoryDelayCache>` を複数の Scheduler / Sweeper に渡すと
//!   「複数インスタンスが 1 つのキャッシュを共有する」状況を再現できる

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::{CacheError, LockToken};
use crate::ports::{Clock, DelayCache, IdGenerator, UlidGenerator};

/// Members ordered by (score, value), with a reverse index for removal.
#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn insert(&mut self, value: &str, score: i64) {
        if let Some(old) = self.scores.insert(value.to_string(), score) {
            self.ordered.remove(&(old, value.to_string()));
        }
        self.ordered.insert((score, value.to_string()));
    }

    fn remove(&mut self, value: &str) -> bool {
        match self.scores.remove(value) {
            Some(score) => {
                self.ordered.remove(&(score, value.to_string()));
                true
            }
            None => false,
        }
    }

    fn range(&self, min: i64, max: i64) -> Vec<String> {
        if min > max {
            return Vec::new();
        }
        self.ordered
            .range((min, String::new())..)
            .take_while(|(score, _)| *score <= max)
            .map(|(_, value)| value.clone())
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Lease {
    token: LockToken,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    lists: HashMap<String, VecDeque<String>>,
    sorted_sets: HashMap<String, SortedSet>,
    leases: HashMap<String, Lease>,
}

impl CacheState {
    fn drop_if_empty_list(&mut self, key: &str) {
        if self.lists.get(key).is_some_and(VecDeque::is_empty) {
            self.lists.remove(key);
        }
    }

    fn drop_if_empty_set(&mut self, key: &str) {
        if self.sorted_sets.get(key).is_some_and(SortedSet::is_empty) {
            self.sorted_sets.remove(key);
        }
    }
}

/// Process-local [`DelayCache`].
pub struct InMemoryDelayCache {
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
    tokens: UlidGenerator<Arc<dyn Clock>>,
}

impl InMemoryDelayCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            tokens: UlidGenerator::new(Arc::clone(&clock)),
            clock,
        }
    }
}

#[async_trait]
impl DelayCache for InMemoryDelayCache {
    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        state
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn list_pop_back(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut state = self.state.lock().await;
        let popped = state.lists.get_mut(key).and_then(VecDeque::pop_back);
        state.drop_if_empty_list(key);
        Ok(popped)
    }

    async fn list_remove_value(
        &self,
        key: &str,
        count: usize,
        value: &str,
    ) -> Result<usize, CacheError> {
        let mut state = self.state.lock().await;
        let Some(list) = state.lists.get_mut(key) else {
            return Ok(0);
        };

        let limit = if count == 0 { usize::MAX } else { count };
        let mut removed = 0;
        list.retain(|entry| {
            if removed < limit && entry == value {
                removed += 1;
                false
            } else {
                true
            }
        });
        state.drop_if_empty_list(key);
        Ok(removed)
    }

    async fn sorted_set_add(&self, key: &str, value: &str, score: i64) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        state
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .insert(value, score);
        Ok(())
    }

    async fn sorted_set_remove_value(&self, key: &str, value: &str) -> Result<bool, CacheError> {
        let mut state = self.state.lock().await;
        let removed = state
            .sorted_sets
            .get_mut(key)
            .is_some_and(|set| set.remove(value));
        state.drop_if_empty_set(key);
        Ok(removed)
    }

    async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<String>, CacheError> {
        let state = self.state.lock().await;
        Ok(state
            .sorted_sets
            .get(key)
            .map(|set| set.range(min, max))
            .unwrap_or_default())
    }

    async fn scan_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let state = self.state.lock().await;
        let mut keys: Vec<String> = state
            .lists
            .keys()
            .chain(state.sorted_sets.keys())
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn try_acquire_lock(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, CacheError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Backend(format!("lease ttl out of range: {e}")))?;
        let now = self.clock.now();

        let mut state = self.state.lock().await;
        if let Some(lease) = state.leases.get(name)
            && lease.expires_at > now
        {
            tracing::trace!(lock = name, holder = %lease.token, "lease still held");
            return Ok(None);
        }

        let token = self.tokens.generate_lock_token();
        state.leases.insert(
            name.to_string(),
            Lease {
                token,
                expires_at: now + ttl,
            },
        );
        Ok(Some(token))
    }

    /// Only values still present in the future set are moved, so an entry
    /// cancelled between the range query and the transfer is not revived.
    async fn atomic_transfer(
        &self,
        future_key: &str,
        ready_key: &str,
        values: &[String],
    ) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        let mut moved = Vec::with_capacity(values.len());
        if let Some(set) = state.sorted_sets.get_mut(future_key) {
            for value in values {
                if set.remove(value) {
                    moved.push(value.clone());
                }
            }
        }
        state.drop_if_empty_set(future_key);

        if !moved.is_empty() {
            let list = state.lists.entry(ready_key.to_string()).or_default();
            for value in moved {
                list.push_front(value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl InMemoryDelayCache {
    /// Ready list contents, push end first.
    pub(crate) async fn list_snapshot(&self, key: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Future set contents, ascending by score.
    pub(crate) async fn sorted_set_snapshot(&self, key: &str) -> Vec<(String, i64)> {
        let state = self.state.lock().await;
        state
            .sorted_sets
            .get(key)
            .map(|set| {
                set.ordered
                    .iter()
                    .map(|(score, value)| (value.clone(), *score))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) async fn lease_holder(&self, name: &str) -> Option<LockToken> {
        let state = self.state.lock().await;
        state.leases.get(name).map(|lease| lease.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;

    fn cache_at(start: DateTime<Utc>) -> (Arc<FixedClock>, InMemoryDelayCache) {
        let clock = Arc::new(FixedClock::new(start));
        let cache = InMemoryDelayCache::new(clock.clone());
        (clock, cache)
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn list_is_fifo_between_push_and_pop_ends() {
        let (_, cache) = cache_at(start());
        for v in ["a", "b", "c"] {
            cache.list_push_front("topic:1_1", v).await.unwrap();
        }

        assert_eq!(cache.list_pop_back("topic:1_1").await.unwrap().as_deref(), Some("a"));
        assert_eq!(cache.list_pop_back("topic:1_1").await.unwrap().as_deref(), Some("b"));
        assert_eq!(cache.list_pop_back("topic:1_1").await.unwrap().as_deref(), Some("c"));
        assert_eq!(cache.list_pop_back("topic:1_1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_remove_value_honours_count() {
        let (_, cache) = cache_at(start());
        for v in ["x", "y", "x", "x"] {
            cache.list_push_front("k", v).await.unwrap();
        }

        assert_eq!(cache.list_remove_value("k", 1, "x").await.unwrap(), 1);
        assert_eq!(cache.list_remove_value("k", 0, "x").await.unwrap(), 2);
        assert_eq!(cache.list_remove_value("k", 0, "x").await.unwrap(), 0);
        assert_eq!(cache.list_snapshot("k").await, vec!["y".to_string()]);
        assert_eq!(cache.list_remove_value("missing", 0, "x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sorted_set_range_is_inclusive_and_ordered() {
        let (_, cache) = cache_at(start());
        cache.sorted_set_add("future:1_1", "late", 300).await.unwrap();
        cache.sorted_set_add("future:1_1", "early", 100).await.unwrap();
        cache.sorted_set_add("future:1_1", "mid", 200).await.unwrap();

        let due = cache
            .sorted_set_range_by_score("future:1_1", 0, 200)
            .await
            .unwrap();
        assert_eq!(due, vec!["early".to_string(), "mid".to_string()]);

        // re-adding moves the score instead of duplicating
        cache.sorted_set_add("future:1_1", "late", 50).await.unwrap();
        let all = cache
            .sorted_set_range_by_score("future:1_1", i64::MIN, i64::MAX)
            .await
            .unwrap();
        assert_eq!(all, vec!["late", "early", "mid"]);
    }

    #[tokio::test]
    async fn empty_structures_leave_the_key_space() {
        let (_, cache) = cache_at(start());
        cache.sorted_set_add("future:1_1", "a", 1).await.unwrap();
        cache.list_push_front("topic:1_1", "b").await.unwrap();
        assert_eq!(
            cache.scan_keys_by_prefix("future:").await.unwrap(),
            vec!["future:1_1".to_string()]
        );

        assert!(cache.sorted_set_remove_value("future:1_1", "a").await.unwrap());
        assert!(!cache.sorted_set_remove_value("future:1_1", "a").await.unwrap());
        cache.list_pop_back("topic:1_1").await.unwrap();

        assert!(cache.scan_keys_by_prefix("future:").await.unwrap().is_empty());
        assert!(cache.scan_keys_by_prefix("topic:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lease_blocks_until_expiry() {
        let (clock, cache) = cache_at(start());
        let ttl = Duration::from_secs(30);

        let first = cache.try_acquire_lock("sync", ttl).await.unwrap();
        assert!(first.is_some());
        assert_eq!(cache.lease_holder("sync").await, first);
        assert!(cache.try_acquire_lock("sync", ttl).await.unwrap().is_none());
        assert!(cache.try_acquire_lock("other", ttl).await.unwrap().is_some());

        clock.advance(chrono::Duration::seconds(29));
        assert!(cache.try_acquire_lock("sync", ttl).await.unwrap().is_none());

        clock.advance(chrono::Duration::seconds(1));
        let second = cache.try_acquire_lock("sync", ttl).await.unwrap();
        assert!(second.is_some());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn atomic_transfer_moves_only_present_values() {
        let (_, cache) = cache_at(start());
        cache.sorted_set_add("future:1_1", "a", 1).await.unwrap();
        cache.sorted_set_add("future:1_1", "b", 2).await.unwrap();
        cache.sorted_set_add("future:1_1", "c", 99).await.unwrap();

        let values = vec!["a".to_string(), "b".to_string(), "gone".to_string()];
        cache
            .atomic_transfer("future:1_1", "topic:1_1", &values)
            .await
            .unwrap();

        assert_eq!(cache.sorted_set_snapshot("future:1_1").await, vec![("c".to_string(), 99)]);
        // pushed in order, so "a" is popped first
        assert_eq!(cache.list_snapshot("topic:1_1").await, vec!["b", "a"]);
    }
}
