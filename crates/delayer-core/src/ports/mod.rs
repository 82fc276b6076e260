//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（SQL ストア, 共有キャッシュ）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - TaskStore が source of truth（正本）
//! - DelayCache は配置先（ready list / future set）と lease lock
//! - どちらも `Arc<dyn ...>` として構築時に注入する

pub mod clock;
pub mod delay_cache;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delay_cache::DelayCache;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::TaskStore;
