//! TaskKind trait - 型付きタスクの定義
//!
//! task_type / priority を型に結び付け、バケットの typo をコンパイル時に排除します。

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::Bucket;

/// A payload type bound to one bucket.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct ArticleReview {
///     article_id: u64,
/// }
///
/// impl TaskKind for ArticleReview {
///     const TASK_TYPE: i32 = 1001;
///     const PRIORITY: i32 = 1;
/// }
/// ```
pub trait TaskKind: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TASK_TYPE: i32;
    const PRIORITY: i32;

    fn bucket() -> Bucket {
        Bucket::new(Self::TASK_TYPE, Self::PRIORITY)
    }
}
