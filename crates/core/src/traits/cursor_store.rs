use std::time::Duration;

use async_trait::async_trait;

use crate::SyncResult;

/// 外部KV协调边界
///
/// 持久化增量断点位点与任务心跳，按任务id作键；值对本核心是
/// 不透明字符串。
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, key: &str) -> SyncResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SyncResult<()>;

    async fn delete(&self, key: &str) -> SyncResult<bool>;
}
