//! App - アプリケーション層
//!
//! ports を組み合わせてスケジューラを構成します。
//!
//! # 主要コンポーネント
//! - **Scheduler**: add / cancel / poll と配置ルール
//! - **MigrationSweeper**: future set → ready list の定期移送（lease lock 付き）
//! - **ScheduleClient**: 呼び出し側の入口（型付きヘルパー含む）
//! - **ConsumerGroup**: バケットごとの poll ループ
//! - **AppBuilder**: 構築とワイヤリング

pub mod builder;
pub mod client;
pub mod consumer_loop;
pub mod scheduler;
pub mod sweeper;

pub use self::builder::{App, AppBuilder, BuildError, RunningApp};
pub use self::client::ScheduleClient;
pub use self::consumer_loop::ConsumerGroup;
pub use self::scheduler::{Placement, Scheduler};
pub use self::sweeper::{MigrationSweeper, SweepOutcome, SweepReport};
