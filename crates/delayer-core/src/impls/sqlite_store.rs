//! SqliteTaskStore - 永続化される正本
//!
//! テーブル:
//! - `taskinfo`: 生存中のタスク（終了時に DELETE）
//! - `taskinfo_logs`: status / version 付きの監査ログ
//!
//! `create` は 1 トランザクション、`update_log` は `WHERE version = ?` による楽観ロック。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{NewTask, StoreError, Task, TaskId, TaskLog, TaskRecord, TaskStatus};
use crate::ports::{Clock, IdGenerator, TaskStore, UlidGenerator};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS taskinfo (
    task_id TEXT PRIMARY KEY,
    task_type INTEGER NOT NULL,
    priority INTEGER NOT NULL,
    execute_time INTEGER NOT NULL,
    parameters BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_taskinfo_execute_time ON taskinfo (execute_time);
CREATE TABLE IF NOT EXISTS taskinfo_logs (
    task_id TEXT PRIMARY KEY,
    task_type INTEGER NOT NULL,
    priority INTEGER NOT NULL,
    execute_time INTEGER NOT NULL,
    parameters BLOB NOT NULL,
    status INTEGER NOT NULL,
    version INTEGER NOT NULL
);";

pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
    ids: UlidGenerator<Arc<dyn Clock>>,
}

impl SqliteTaskStore {
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Self::with_connection(Connection::open(path)?, clock)
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ids: UlidGenerator::new(clock),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("connection poisoned: {e}")))
    }
}

fn insert_record_stmt(conn: &Connection, task: &Task) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO taskinfo (task_id, task_type, priority, execute_time, parameters)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            task.task_id.as_ulid().to_string(),
            task.task_type,
            task.priority,
            task.execute_time.timestamp_millis(),
            task.parameters,
        ],
    )?;
    Ok(())
}

fn insert_log_stmt(conn: &Connection, log: &TaskLog) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO taskinfo_logs
            (task_id, task_type, priority, execute_time, parameters, status, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            log.task_id.as_ulid().to_string(),
            log.task_type,
            log.priority,
            log.execute_time.timestamp_millis(),
            log.parameters,
            log.status.code(),
            log.version,
        ],
    )?;
    Ok(())
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn task_id_at(row: &Row<'_>, column: usize) -> rusqlite::Result<TaskId> {
    let raw: String = row.get(column)?;
    raw.parse()
        .map_err(|e| conversion_error(column, format!("bad task id {raw}: {e}")))
}

fn time_at(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(column)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| conversion_error(column, format!("bad timestamp {millis}")))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        task_id: task_id_at(row, 0)?,
        task_type: row.get(1)?,
        priority: row.get(2)?,
        execute_time: time_at(row, 3)?,
        parameters: row.get(4)?,
    })
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<TaskLog> {
    let code: i64 = row.get(5)?;
    let status = TaskStatus::from_code(code)
        .ok_or_else(|| conversion_error(5, format!("bad status {code}")))?;
    Ok(TaskLog {
        task_id: task_id_at(row, 0)?,
        task_type: row.get(1)?,
        priority: row.get(2)?,
        execute_time: time_at(row, 3)?,
        parameters: row.get(4)?,
        status,
        version: row.get(6)?,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    fn next_task_id(&self) -> TaskId {
        self.ids.generate_task_id()
    }

    async fn insert_record(&self, task: &Task) -> Result<(), StoreError> {
        let conn = self.conn()?;
        insert_record_stmt(&conn, task)
    }

    async fn delete_record(&self, task_id: TaskId) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM taskinfo WHERE task_id = ?1",
            params![task_id.as_ulid().to_string()],
        )?;
        Ok(())
    }

    async fn get_record(&self, task_id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT task_id, task_type, priority, execute_time, parameters
                 FROM taskinfo WHERE task_id = ?1",
                params![task_id.as_ulid().to_string()],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    async fn insert_log(&self, log: &TaskLog) -> Result<(), StoreError> {
        let conn = self.conn()?;
        insert_log_stmt(&conn, log)
    }

    async fn get_log(&self, task_id: TaskId) -> Result<TaskLog, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT task_id, task_type, priority, execute_time, parameters, status, version
             FROM taskinfo_logs WHERE task_id = ?1",
            params![task_id.as_ulid().to_string()],
            log_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound(task_id))
    }

    async fn update_log(&self, log: &TaskLog) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let id = log.task_id.as_ulid().to_string();
        let expected = log.version.saturating_sub(1);
        let updated = conn.execute(
            "UPDATE taskinfo_logs SET status = ?1, version = ?2
             WHERE task_id = ?3 AND version = ?4",
            params![log.status.code(), log.version, id, expected],
        )?;
        if updated == 1 {
            return Ok(());
        }

        let found: Option<u32> = conn
            .query_row(
                "SELECT version FROM taskinfo_logs WHERE task_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match found {
            Some(found) => Err(StoreError::VersionConflict {
                task_id: log.task_id,
                expected,
                found,
            }),
            None => Err(StoreError::NotFound(log.task_id)),
        }
    }

    async fn create(&self, new_task: &NewTask) -> Result<Task, StoreError> {
        let task = new_task.clone().with_id(self.next_task_id());
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        insert_record_stmt(&tx, &task)?;
        insert_log_stmt(&tx, &TaskLog::scheduled(&task))?;
        tx.commit()?;
        Ok(task)
    }
}
