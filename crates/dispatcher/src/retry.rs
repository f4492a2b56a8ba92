use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vecsync_core::config::RetryConfig;
use vecsync_core::models::{FailureNotice, RetryState};
use vecsync_core::traits::{Envelope, MessageQueue};
use vecsync_core::SyncResult;

/// 重试退避策略
///
/// delay = min(base * 2^(attempt-1), max)，attempt从1起计。退避是
/// 确定性的：同一attempt永远得到同一延迟，测试可以精确断言。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
        }
    }

    /// 第attempt次失败后的挂起时长
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let factor = 1u64 << shift;
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(600), // 10分钟
            max_attempts: 10,
        }
    }
}

/// 投递失败重试队列
///
/// 每个(destination, key)一个条目，attempt计数用原子量承接并发
/// 重投。条目在Resolved或Exhausted时清除，重试表不会无界增长；
/// 耗尽后向告警队列发一条升级消息，之后不再自动重投。
pub struct RetryQueue {
    queue: Arc<dyn MessageQueue>,
    alert_destination: String,
    policy: RetryPolicy,
    entries: Arc<Mutex<HashMap<(String, String), Arc<AtomicU32>>>>,
}

impl RetryQueue {
    pub fn new<S: Into<String>>(
        queue: Arc<dyn MessageQueue>,
        alert_destination: S,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            alert_destination: alert_destination.into(),
            policy,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 当前条目状态；不存在的键视为Pending（尚无失败记录）
    pub async fn state(&self, destination: &str, key: &str) -> RetryState {
        let entries = self.entries.lock().await;
        match entries.get(&(destination.to_string(), key.to_string())) {
            Some(counter) => RetryState::Retrying {
                attempt: counter.load(Ordering::SeqCst),
            },
            None => RetryState::Pending,
        }
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// 处理一条失败通知：立即重投一次，失败则按退避策略继续，
    /// 直到成功或耗尽。返回条目的终态。
    ///
    /// 同一(destination, key)已在重试中时不开启第二条退避循环，
    /// 直接返回当前的Retrying状态。
    pub async fn process(&self, notice: FailureNotice) -> SyncResult<RetryState> {
        let entry_key = notice.entry_key();
        let counter = {
            let mut entries = self.entries.lock().await;
            if let Some(existing) = entries.get(&entry_key) {
                let attempt = existing.load(Ordering::SeqCst);
                debug!(
                    destination = %notice.destination,
                    key = %notice.key,
                    attempt,
                    "条目已在重试中，忽略重复通知"
                );
                return Ok(RetryState::Retrying { attempt });
            }
            let counter = Arc::new(AtomicU32::new(0));
            entries.insert(entry_key.clone(), Arc::clone(&counter));
            counter
        };

        info!(
            destination = %notice.destination,
            key = %notice.key,
            error = %notice.error_message,
            "开始重投失败消息"
        );

        let envelope = Envelope::new(notice.key.clone(), notice.payload.clone());
        let mut attempt = 0u32;
        let state = loop {
            attempt += 1;
            counter.store(attempt, Ordering::SeqCst);

            match self.queue.publish(&notice.destination, &envelope).await {
                Ok(()) => {
                    info!(
                        destination = %notice.destination,
                        key = %notice.key,
                        attempts = attempt,
                        "重投成功"
                    );
                    break RetryState::Resolved { attempts: attempt };
                }
                Err(e) if attempt >= self.policy.max_attempts => {
                    error!(
                        destination = %notice.destination,
                        key = %notice.key,
                        attempts = attempt,
                        error = %e,
                        "重试耗尽，升级告警"
                    );
                    break RetryState::Exhausted { attempts: attempt };
                }
                Err(e) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        destination = %notice.destination,
                        key = %notice.key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "重投失败，退避后继续"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        // 终态条目立即清除
        self.entries.lock().await.remove(&entry_key);

        if let RetryState::Exhausted { attempts } = state {
            self.dispatch_alert(&notice, attempts).await?;
        }
        Ok(state)
    }

    /// 后台处理失败通知，调用方不等待退避完成
    pub fn spawn_process(self: &Arc<Self>, notice: FailureNotice) -> JoinHandle<SyncResult<RetryState>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.process(notice).await })
    }

    async fn dispatch_alert(&self, notice: &FailureNotice, attempts: u32) -> SyncResult<()> {
        let alert = Envelope::new(
            notice.key.clone(),
            json!({
                "destination": notice.destination,
                "key": notice.key,
                "error_message": notice.error_message,
                "attempts": attempts,
                "payload": notice.payload,
            }),
        );
        self.queue.publish(&self.alert_destination, &alert).await?;
        info!(
            destination = %notice.destination,
            key = %notice.key,
            "告警已发布"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(512));
        // 10分钟封顶
        assert_eq!(policy.delay_for(11), Duration::from_secs(600));
        assert_eq!(policy.delay_for(60), Duration::from_secs(600));
    }

    #[test]
    fn test_delay_strictly_increases_within_max_attempts() {
        let policy = RetryPolicy::default();
        for attempt in 1..policy.max_attempts {
            assert!(policy.delay_for(attempt + 1) > policy.delay_for(attempt));
            assert!(policy.delay_for(attempt) <= Duration::from_secs(600));
        }
    }
}
