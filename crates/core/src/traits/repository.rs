use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{SyncTask, TaskStatus};
use crate::SyncResult;

/// 任务仓储
///
/// 任务的状态/进度记录是多个worker共享的唯一可变状态：进度计数
/// last-writer-wins即可，状态迁移必须compare-and-swap，防止慢worker
/// 覆盖后到的终态。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &SyncTask) -> SyncResult<SyncTask>;

    async fn get_by_id(&self, id: i64) -> SyncResult<Option<SyncTask>>;

    async fn list_all(&self) -> SyncResult<Vec<SyncTask>>;

    /// 到期任务：enabled且next_run_at <= now
    async fn list_due(&self, now: DateTime<Utc>) -> SyncResult<Vec<SyncTask>>;

    async fn update(&self, task: &SyncTask) -> SyncResult<()>;

    /// 状态CAS：仅当当前状态等于expected时迁移到next，返回是否成功
    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> SyncResult<bool>;

    /// 进度更新，按字段last-writer-wins
    async fn update_progress(
        &self,
        id: i64,
        progress: i32,
        synced_count: i64,
        total_count: i64,
    ) -> SyncResult<()>;

    async fn delete(&self, id: i64) -> SyncResult<bool>;
}
