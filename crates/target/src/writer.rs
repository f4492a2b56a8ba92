use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use vecsync_core::models::VectorRecord;
use vecsync_core::traits::{MetricType, VectorStore};
use vecsync_core::{SyncError, SyncResult};

/// 目标端写入器
///
/// 所有对向量库的写入都经过这里：单条/批量插入、删除、以及让
/// at-least-once投递安全的幂等写。每次调用都有超时上限，不存在
/// 无界阻塞的写入路径。
pub struct SyncWriter {
    store: Arc<dyn VectorStore>,
    write_timeout: Duration,
}

impl SyncWriter {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            write_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    async fn bounded<F, T>(&self, op: &str, fut: F) -> SyncResult<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        tokio::time::timeout(self.write_timeout, fut)
            .await
            .map_err(|_| {
                SyncError::Timeout(format!(
                    "目标写入超时: op={op}, timeout={}ms",
                    self.write_timeout.as_millis()
                ))
            })?
    }

    /// 单条插入
    pub async fn write(&self, collection: &str, record: &VectorRecord) -> SyncResult<bool> {
        debug!(collection = %collection, pk = record.primary_key, "写入单条记录");
        self.bounded("insert", self.store.insert(collection, record))
            .await
    }

    /// 整批插入，只报告整批成败；逐条降级由调用方决定
    pub async fn batch_write(&self, collection: &str, records: &[VectorRecord]) -> SyncResult<bool> {
        if records.is_empty() {
            return Ok(true);
        }
        debug!(collection = %collection, count = records.len(), "批量写入记录");
        self.bounded("batch_insert", self.store.batch_insert(collection, records))
            .await
    }

    pub async fn delete(&self, collection: &str, primary_key: i64) -> SyncResult<bool> {
        debug!(collection = %collection, pk = primary_key, "删除记录");
        self.bounded("delete", self.store.delete(collection, primary_key))
            .await
    }

    /// 幂等写：同一主键写两次与写一次的终态一致
    ///
    /// 目标原生支持upsert时直接覆盖写；否则退化为先删后插。
    pub async fn idempotent_write(
        &self,
        collection: &str,
        record: &VectorRecord,
    ) -> SyncResult<bool> {
        if self.store.supports_upsert() {
            return self
                .bounded("upsert", self.store.upsert(collection, record))
                .await;
        }

        self.bounded("delete", self.store.delete(collection, record.primary_key))
            .await?;
        self.bounded("insert", self.store.insert(collection, record))
            .await
    }

    /// 确保集合存在且维度兼容
    ///
    /// 已存在且兼容时是幂等空操作；维度冲突由存储层报SchemaConflict，
    /// 原样上抛，需要显式迁移而不是自动覆盖。
    pub async fn ensure_collection(&self, name: &str, dimension: usize) -> SyncResult<()> {
        let created = self
            .bounded("create_collection", self.store.create_collection(name, dimension))
            .await?;
        if created {
            info!(collection = %name, dimension, "集合已创建");
        } else {
            debug!(collection = %name, "集合已存在，跳过创建");
        }
        Ok(())
    }

    /// 确保索引存在且类型兼容
    pub async fn ensure_index(
        &self,
        collection: &str,
        field: &str,
        index_type: &str,
        metric: MetricType,
    ) -> SyncResult<()> {
        let created = self
            .bounded(
                "create_index",
                self.store.create_index(collection, field, index_type, metric),
            )
            .await?;
        if created {
            info!(collection = %collection, field = %field, index_type = %index_type, "索引已创建");
        }
        Ok(())
    }

    /// 整批失败后的逐条降级：每条独立幂等写，返回成功条数
    pub async fn write_each(&self, collection: &str, records: &[VectorRecord]) -> SyncResult<usize> {
        let mut written = 0usize;
        for record in records {
            match self.idempotent_write(collection, record).await {
                Ok(true) => written += 1,
                Ok(false) => {
                    warn!(collection = %collection, pk = record.primary_key, "单条写入被拒绝");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }
}
