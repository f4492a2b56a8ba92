use thiserror::Error;

/// 同步系统统一错误类型
///
/// 错误分为三类：致命错误（配置类，立即终止本次运行）、可重试错误
/// （连接类，交给重试队列）、以及需要人工介入的错误（认证、结构冲突）。
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("分片范围无效: min_id={min_id}, max_id={max_id}, concurrency={concurrency}")]
    InvalidRange {
        min_id: i64,
        max_id: i64,
        concurrency: i64,
    },
    #[error("数据源连接失败: {0}")]
    Connection(String),
    #[error("数据源认证失败: {0}")]
    Authentication(String),
    #[error("目标结构冲突: {0}")]
    SchemaConflict(String),
    #[error("任务不存在: id={id}")]
    TaskNotFound { id: i64 },
    #[error("任务已禁用: id={id}")]
    TaskDisabled { id: i64 },
    #[error("任务正在运行: id={id}")]
    TaskRunning { id: i64 },
    #[error("任务被取消: id={id}")]
    Cancelled { id: i64 },
    #[error("数据库操作失败: {0}")]
    Database(String),
    #[error("向量库操作失败: {0}")]
    VectorStore(String),
    #[error("消息队列操作失败: {0}")]
    MessageQueue(String),
    #[error("缓存操作失败: {0}")]
    Cache(String),
    #[error("数据序列化错误: {0}")]
    Serialization(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn connection_error<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    pub fn task_not_found(id: i64) -> Self {
        Self::TaskNotFound { id }
    }

    /// 致命错误不进入重试队列，直接使本次运行失败
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration(_)
                | SyncError::InvalidRange { .. }
                | SyncError::Authentication(_)
                | SyncError::SchemaConflict(_)
                | SyncError::Internal(_)
        )
    }

    /// 可重试错误交给重试队列按退避策略重投
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_)
                | SyncError::Database(_)
                | SyncError::VectorStore(_)
                | SyncError::MessageQueue(_)
                | SyncError::Cache(_)
                | SyncError::Timeout(_)
        )
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SyncError::Configuration("bad".into()).is_fatal());
        assert!(SyncError::Authentication("denied".into()).is_fatal());
        assert!(!SyncError::Authentication("denied".into()).is_retryable());
        assert!(SyncError::Connection("refused".into()).is_retryable());
        assert!(!SyncError::Connection("refused".into()).is_fatal());
        assert!(SyncError::SchemaConflict("dim".into()).is_fatal());
        assert!(!SyncError::TaskDisabled { id: 1 }.is_retryable());
    }
}
