use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use vecsync_core::models::{SyncTask, TaskStatus};
use vecsync_core::traits::TaskRepository;
use vecsync_core::{SyncError, SyncResult};

/// 内存任务仓储
///
/// 状态CAS在仓储锁内完成，多个worker并发提交终态时只有
/// 期望状态匹配的那一个生效。
#[derive(Clone)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<i64, SyncTask>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl Default for InMemoryTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: &SyncTask) -> SyncResult<SyncTask> {
        let mut stored = task.clone();
        if stored.id == 0 {
            stored.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        }
        stored.created_at = Utc::now();
        stored.updated_at = stored.created_at;

        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&stored.id) {
            return Err(SyncError::Database(format!("任务id重复: {}", stored.id)));
        }
        tasks.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: i64) -> SyncResult<Option<SyncTask>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> SyncResult<Vec<SyncTask>> {
        let mut all: Vec<SyncTask> = self.tasks.read().await.values().cloned().collect();
        all.sort_by_key(|t| t.id);
        Ok(all)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> SyncResult<Vec<SyncTask>> {
        let mut due: Vec<SyncTask> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.enabled && t.next_run_at.map(|at| at <= now).unwrap_or(false))
            .cloned()
            .collect();
        due.sort_by_key(|t| t.id);
        Ok(due)
    }

    async fn update(&self, task: &SyncTask) -> SyncResult<()> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                existing.updated_at = Utc::now();
                Ok(())
            }
            None => Err(SyncError::TaskNotFound { id: task.id }),
        }
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> SyncResult<bool> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or(SyncError::TaskNotFound { id })?;
        if task.status != expected {
            return Ok(false);
        }
        task.status = next;
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_progress(
        &self,
        id: i64,
        progress: i32,
        synced_count: i64,
        total_count: i64,
    ) -> SyncResult<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or(SyncError::TaskNotFound { id })?;
        task.set_progress(progress);
        task.synced_count = synced_count;
        task.total_count = total_count;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: i64) -> SyncResult<bool> {
        Ok(self.tasks.write().await.remove(&id).is_some())
    }
}
