//! DelayCache port - 全インスタンスで共有されるキャッシュ（Redis 相当）
//!
//! 4 種類のプリミティブを提供します：
//! - ordered list（push / destructive pop / 値一致削除）
//! - sorted set（score = 実行時刻のミリ秒）
//! - key prefix scan
//! - lease lock（ブロックしない排他制御）
//!
//! 空になった list / sorted set はキー空間から消えます。
//! そのため prefix scan は中身のある構造だけを返します。

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{CacheError, LockToken};

/// DelayCache は scheduler の配置先
///
/// # 設計原則
/// - 各メソッドはそれ自体がアトミック
/// - list は front に push、back から pop（FIFO）
/// - `atomic_transfer` は「両方にある」「どちらにもない」を観測させない
/// - 構築時に注入する（グローバル状態にしない）
#[async_trait]
pub trait DelayCache: Send + Sync {
    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Destructive pop from the end opposite to the push end.
    async fn list_pop_back(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Removes up to `count` entries equal to `value`; `count == 0` removes all.
    /// Returns the number removed.
    async fn list_remove_value(
        &self,
        key: &str,
        count: usize,
        value: &str,
    ) -> Result<usize, CacheError>;

    async fn sorted_set_add(&self, key: &str, value: &str, score: i64) -> Result<(), CacheError>;

    async fn sorted_set_remove_value(&self, key: &str, value: &str) -> Result<bool, CacheError>;

    /// Members with `min <= score <= max`, ascending by score.
    async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<String>, CacheError>;

    async fn scan_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Takes the named lease if it is free or expired. Never waits.
    async fn try_acquire_lock(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, CacheError>;

    /// Pushes every value onto `ready_key` and removes it from `future_key`
    /// as one step.
    async fn atomic_transfer(
        &self,
        future_key: &str,
        ready_key: &str,
        values: &[String],
    ) -> Result<(), CacheError>;
}
