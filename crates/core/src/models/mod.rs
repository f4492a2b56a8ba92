pub mod consistency;
pub mod record;
pub mod retry;
pub mod source;
pub mod task;

pub use consistency::ConsistencyReport;
pub use record::{SourceRow, VectorRecord};
pub use retry::{FailureNotice, RetryState};
pub use source::SourceConfig;
pub use task::{ScheduleType, SyncTask, TaskStatus, TaskType};
