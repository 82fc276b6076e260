//! Domain model (ids, tasks, store rows, errors).

pub mod errors;
pub mod ids;
pub mod record;
pub mod task;

pub use self::errors::{CacheError, CodecError, ErrorKind, SchedulerError, StoreError};
pub use self::ids::{LockToken, TaskId};
pub use self::record::{TaskLog, TaskRecord, TaskStatus};
pub use self::task::{Bucket, NewTask, QueueKeys, Task};
