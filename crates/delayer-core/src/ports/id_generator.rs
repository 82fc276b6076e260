//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{LockToken, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散システムで使える ID を生成
///
/// 複数インスタンスが調整なしで TaskId / LockToken を発行できる必要があります。
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_lock_token(&self) -> LockToken;
}

/// UlidGenerator は Clock の時刻をタイムスタンプ部に使う ULID 生成器
///
/// FixedClock を渡すと timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn generate_lock_token(&self) -> LockToken {
        LockToken::from(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_task_id();
        let id2 = id_gen.generate_task_id();
        let id3 = id_gen.generate_task_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_task_id();
        let id2 = id_gen.generate_task_id();

        // ランダム部分があるので ID は異なる
        assert_ne!(id1, id2);

        // timestamp 部分は同じ
        assert_eq!(id1.as_ulid().timestamp_ms(), id2.as_ulid().timestamp_ms());
        assert_eq!(
            id1.as_ulid().timestamp_ms(),
            fixed_time.timestamp_millis() as u64
        );
    }

    #[test]
    fn lock_tokens_use_their_own_prefix() {
        let id_gen = UlidGenerator::new(SystemClock);
        assert!(id_gen.generate_lock_token().to_string().starts_with("lock-"));
        assert!(id_gen.generate_task_id().to_string().starts_with("task-"));
    }
}
