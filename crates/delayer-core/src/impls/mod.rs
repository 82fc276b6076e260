//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryDelayCache**: 開発用・テスト用の共有キャッシュ
//! - **InMemoryTaskStore**: テスト用の正本
//! - **SqliteTaskStore**: rusqlite による永続化された正本
//!
//! 本番で Redis 等を使う場合は、別クレートで `DelayCache` を実装します。

#[cfg(test)]
pub(crate) mod flaky_cache;
pub mod inmem_cache;
pub mod inmem_store;
pub mod sqlite_store;

pub use self::inmem_cache::InMemoryDelayCache;
pub use self::inmem_store::InMemoryTaskStore;
pub use self::sqlite_store::SqliteTaskStore;
