use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use vecsync_core::traits::CursorStore;
use vecsync_core::SyncResult;

/// 内存KV存储
///
/// TTL基于tokio时钟，在start_paused测试里可以精确推进。
#[derive(Clone)]
pub struct InMemoryCursorStore {
    entries: Arc<Mutex<HashMap<String, (String, Option<Instant>)>>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryCursorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, Some(expires_at))) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SyncResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> SyncResult<bool> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }
}
