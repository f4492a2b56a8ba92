use serde::{Deserialize, Serialize};

use crate::{SyncError, SyncResult};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub message_queue: MessageQueueConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// 同步执行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 并发运行的任务数上限
    pub run_pool_size: usize,
    /// 默认批大小
    pub batch_size: usize,
    /// 默认向量维度
    pub dimension: usize,
    /// 单次目标写入的超时（毫秒）
    pub write_timeout_ms: u64,
    /// 单次源端查询的超时（毫秒）
    pub query_timeout_ms: u64,
    /// 心跳TTL（秒）
    pub heartbeat_ttl_secs: u64,
    /// 一致性抽样条数
    pub sample_size: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            run_pool_size: 8,
            batch_size: 1000,
            dimension: 128,
            write_timeout_ms: 60_000,
            query_timeout_ms: 60_000,
            heartbeat_ttl_secs: 30,
            sample_size: 10,
            retry: RetryConfig::default(),
        }
    }
}

/// 重试退避配置
///
/// delay = min(base * 2^(attempt-1), max)，attempt从1起。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,    // 1秒
            max_delay_ms: 600_000,   // 10分钟
            max_attempts: 10,
        }
    }
}

/// 消息队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQueueConfig {
    pub url: String,
    /// 失败通知队列
    pub failure_queue: String,
    /// 重试耗尽后的告警队列
    pub alert_queue: String,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            failure_queue: "vecsync.failures".to_string(),
            alert_queue: "vecsync.alerts".to_string(),
        }
    }
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vecsync".to_string(),
        }
    }
}

impl AppConfig {
    /// 从TOML文件加载，环境变量（VECSYNC_前缀，__分隔层级）覆盖文件值
    pub fn load(path: Option<&str>) -> SyncResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("VECSYNC")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| SyncError::Configuration(format!("加载配置失败: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| SyncError::Configuration(format!("解析配置失败: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.sync.retry.base_delay_ms, 1_000);
        assert_eq!(cfg.sync.retry.max_delay_ms, 600_000);
        assert_eq!(cfg.sync.retry.max_attempts, 10);
        assert_eq!(cfg.message_queue.alert_queue, "vecsync.alerts");
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vecsync.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[sync]\nrun_pool_size = 2\nbatch_size = 50\ndimension = 64\n\
             write_timeout_ms = 1000\nquery_timeout_ms = 2000\n\
             heartbeat_ttl_secs = 5\nsample_size = 3\n\
             [message_queue]\nurl = \"amqp://mq:5672\"\n\
             failure_queue = \"f\"\nalert_queue = \"a\""
        )
        .unwrap();

        let cfg = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(cfg.sync.run_pool_size, 2);
        assert_eq!(cfg.sync.batch_size, 50);
        assert_eq!(cfg.sync.query_timeout_ms, 2000);
        assert_eq!(cfg.message_queue.alert_queue, "a");
        // 未出现的小节取默认值
        assert_eq!(cfg.cache.key_prefix, "vecsync");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load(Some("/nonexistent/vecsync.toml")).unwrap();
        assert_eq!(cfg.sync.batch_size, 1000);
    }
}
