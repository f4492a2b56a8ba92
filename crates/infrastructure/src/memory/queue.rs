use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use vecsync_core::traits::{Envelope, MessageQueue};
use vecsync_core::{SyncError, SyncResult};

/// 内存消息队列
///
/// fail_next注入的故障只作用于publish，按次递减，用于模拟投递失败
/// 后的重试路径。
#[derive(Clone)]
pub struct InMemoryMessageQueue {
    queues: Arc<Mutex<HashMap<String, VecDeque<Envelope>>>>,
    fail_next: Arc<AtomicU32>,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            fail_next: Arc::new(AtomicU32::new(0)),
        }
    }

    /// 让接下来n次publish失败
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
    }
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(&self, destination: &str, envelope: &Envelope) -> SyncResult<()> {
        if self.take_failure() {
            return Err(SyncError::MessageQueue(format!(
                "注入的发布失败: destination={destination}"
            )));
        }
        let mut queues = self.queues.lock().await;
        queues
            .entry(destination.to_string())
            .or_default()
            .push_back(envelope.clone());
        debug!(destination = %destination, key = %envelope.key, "消息已入队");
        Ok(())
    }

    async fn fetch(&self, destination: &str) -> SyncResult<Vec<Envelope>> {
        let mut queues = self.queues.lock().await;
        Ok(queues
            .get_mut(destination)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default())
    }

    async fn create_queue(&self, destination: &str, _durable: bool) -> SyncResult<()> {
        let mut queues = self.queues.lock().await;
        queues.entry(destination.to_string()).or_default();
        Ok(())
    }

    async fn queue_size(&self, destination: &str) -> SyncResult<u32> {
        let queues = self.queues.lock().await;
        Ok(queues.get(destination).map(|q| q.len() as u32).unwrap_or(0))
    }

    async fn purge_queue(&self, destination: &str) -> SyncResult<()> {
        let mut queues = self.queues.lock().await;
        if let Some(q) = queues.get_mut(destination) {
            q.clear();
        }
        Ok(())
    }
}
