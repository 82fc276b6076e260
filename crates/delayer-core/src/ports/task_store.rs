//! TaskStore port - タスクの正本（source of truth）
//!
//! TaskStore は以下を管理します：
//! - 生存中のタスク（TaskRecord）。終了時に削除される
//! - 監査ログ（TaskLog）。status と version を持ち、削除されない
//!
//! スケジューリングのロジックは持ちません（純粋なストレージ）。

use async_trait::async_trait;

use crate::domain::{NewTask, StoreError, Task, TaskId, TaskLog, TaskRecord};

/// TaskStore は record と log の永続化を担当
///
/// # 設計原則
/// - `update_log` は楽観ロック：保存済み version が `log.version - 1` でなければ
///   `StoreError::VersionConflict`
/// - `create` は record と初期 log を 1 つの論理ステップで書き込む。
///   トランザクションを持つバックエンドは override する
/// - cache への配置とは同一トランザクションにならない
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Assigns the id of the next task.
    fn next_task_id(&self) -> TaskId;

    async fn insert_record(&self, task: &Task) -> Result<(), StoreError>;

    /// Deleting an absent record is not an error.
    async fn delete_record(&self, task_id: TaskId) -> Result<(), StoreError>;

    async fn get_record(&self, task_id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    async fn insert_log(&self, log: &TaskLog) -> Result<(), StoreError>;

    async fn get_log(&self, task_id: TaskId) -> Result<TaskLog, StoreError>;

    async fn update_log(&self, log: &TaskLog) -> Result<(), StoreError>;

    /// Persists a new task: record plus a SCHEDULED log at version 1.
    async fn create(&self, new_task: &NewTask) -> Result<Task, StoreError> {
        let task = new_task.clone().with_id(self.next_task_id());
        self.insert_record(&task).await?;
        self.insert_log(&TaskLog::scheduled(&task)).await?;
        Ok(task)
    }
}
