pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod schedule;
pub mod shard;
pub mod traits;

pub use errors::SyncError;
pub use models::{
    ConsistencyReport, FailureNotice, RetryState, ScheduleType, SourceConfig, SyncTask,
    TaskStatus, TaskType, VectorRecord,
};
pub use shard::{ShardPlanner, ShardRange};

/// 统一的Result类型
pub type SyncResult<T> = std::result::Result<T, SyncError>;
