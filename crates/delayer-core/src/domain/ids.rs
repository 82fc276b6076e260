//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type パターンで型付けしています。
//! - **TaskId**: TaskStore が永続化時に割り当てる ID
//! - **LockToken**: lease lock の取得に成功したときに返る不透明なトークン
//!
//! ULID は時刻でソート可能なので、TaskId の順序は生成順序と一致します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"task-", "lock-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData なので実行時のサイズは Ulid と同じです。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Parses either the bare ULID or the prefixed display form.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Lease lock のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lock {}

impl IdMarker for Lock {
    fn prefix() -> &'static str {
        "lock-"
    }
}

/// Identifier of a scheduled task (assigned on persistence).
pub type TaskId = Id<Task>;

/// Opaque token proving ownership of a lease lock.
pub type LockToken = Id<Lock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let task = TaskId::from_ulid(ulid1);
        let token = LockToken::from_ulid(ulid2);

        assert_eq!(task.as_ulid(), ulid1);
        assert_eq!(token.as_ulid(), ulid2);

        assert!(task.to_string().starts_with("task-"));
        assert!(token.to_string().starts_with("lock-"));
        // let _: TaskId = token; // <- does not compile
    }

    #[test]
    fn task_ids_sort_by_creation_time() {
        let id1 = TaskId::from_ulid(Ulid::from_parts(1_000, 7));
        let id2 = TaskId::from_ulid(Ulid::from_parts(2_000, 3));
        assert!(id1 < id2);
    }

    #[test]
    fn task_id_serializes_as_plain_ulid() {
        let ulid = Ulid::new();
        let task_id = TaskId::from_ulid(ulid);

        let json = serde_json::to_string(&task_id).unwrap();
        assert_eq!(json, format!("\"{ulid}\""));

        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task_id);
    }

    #[test]
    fn parses_prefixed_and_bare_forms() {
        let task_id = TaskId::from_ulid(Ulid::new());

        let prefixed: TaskId = task_id.to_string().parse().unwrap();
        let bare: TaskId = task_id.as_ulid().to_string().parse().unwrap();

        assert_eq!(prefixed, task_id);
        assert_eq!(bare, task_id);
        assert!("task-not-a-ulid".parse::<TaskId>().is_err());
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<LockToken>(), 16);
    }
}
