use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use vecsync_core::config::CacheConfig;
use vecsync_core::traits::CursorStore;
use vecsync_core::{SyncError, SyncResult};

/// Redis断点/心跳存储
///
/// 断点位点不带TTL长期保留；心跳带TTL，worker停止续约后自动过期。
pub struct RedisCursorStore {
    client: Arc<redis::Client>,
    key_prefix: String,
}

impl RedisCursorStore {
    pub async fn new(config: &CacheConfig) -> SyncResult<Self> {
        info!("连接Redis: {}", config.redis_url);

        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| SyncError::Cache(format!("创建Redis客户端失败: {e}")))?;

        // 启动时校验连通性
        let mut conn = client
            .get_connection_manager()
            .await
            .map_err(|e| SyncError::Cache(format!("获取Redis连接失败: {e}")))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Cache(format!("Redis PING失败: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            key_prefix: config.key_prefix.clone(),
        })
    }

    async fn get_connection(&self) -> SyncResult<redis::aio::ConnectionManager> {
        self.client
            .get_connection_manager()
            .await
            .map_err(|e| SyncError::Cache(format!("获取Redis连接失败: {e}")))
    }

    fn build_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }
}

#[async_trait]
impl CursorStore for RedisCursorStore {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let full_key = self.build_key(key);
        let mut conn = self.get_connection().await?;

        let value: Option<String> = redis::cmd("GET")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Cache(format!("GET {full_key} 失败: {e}")))?;

        debug!(key = %full_key, hit = value.is_some(), "读取断点存储");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SyncResult<()> {
        let full_key = self.build_key(key);
        let mut conn = self.get_connection().await?;

        match ttl {
            Some(ttl) => {
                let _: () = redis::cmd("SETEX")
                    .arg(&full_key)
                    .arg(ttl.as_secs().max(1))
                    .arg(value)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| SyncError::Cache(format!("SETEX {full_key} 失败: {e}")))?;
            }
            None => {
                let _: () = redis::cmd("SET")
                    .arg(&full_key)
                    .arg(value)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| SyncError::Cache(format!("SET {full_key} 失败: {e}")))?;
            }
        }

        debug!(key = %full_key, "写入断点存储");
        Ok(())
    }

    async fn delete(&self, key: &str) -> SyncResult<bool> {
        let full_key = self.build_key(key);
        let mut conn = self.get_connection().await?;

        let removed: i64 = redis::cmd("DEL")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Cache(format!("DEL {full_key} 失败: {e}")))?;

        Ok(removed > 0)
    }
}
