use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::SyncResult;

/// 队列中的一条消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    /// 业务键，对队列不透明
    pub key: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new<K: Into<String>>(key: K, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key: key.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn serialize(&self) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> SyncResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// 消息代理边界
///
/// destination对本核心是不透明字符串；重试队列的重投与告警
/// 都通过这层发布。
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, destination: &str, envelope: &Envelope) -> SyncResult<()>;

    /// 拉取destination上当前可用的消息（可能为空）
    async fn fetch(&self, destination: &str) -> SyncResult<Vec<Envelope>>;

    async fn create_queue(&self, destination: &str, durable: bool) -> SyncResult<()>;

    async fn queue_size(&self, destination: &str) -> SyncResult<u32>;

    async fn purge_queue(&self, destination: &str) -> SyncResult<()>;
}
