use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use vecsync_core::models::VectorRecord;
use vecsync_core::traits::{CollectionStats, MetricType, SearchHit, VectorStore};
use vecsync_core::{SyncError, SyncResult};

struct IndexSpec {
    index_type: String,
    metric: MetricType,
}

struct Collection {
    dimension: usize,
    indexes: HashMap<String, IndexSpec>,
    records: BTreeMap<i64, VectorRecord>,
}

/// 内存向量库
///
/// native_upsert控制supports_upsert的返回值，用来同时覆盖幂等写
/// 的两条路径；set_unavailable把整个目标端打成不可用，所有操作
/// 返回VectorStore错误。
#[derive(Clone)]
pub struct InMemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
    native_upsert: bool,
    unavailable: Arc<AtomicBool>,
    fail_next_writes: Arc<AtomicU32>,
    write_delay: Option<Duration>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            native_upsert: true,
            unavailable: Arc::new(AtomicBool::new(false)),
            fail_next_writes: Arc::new(AtomicU32::new(0)),
            write_delay: None,
        }
    }

    /// 每次写操作前挂起固定时长，用于超时路径的验证
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// 不支持原生upsert的目标，幂等写会走先删后插
    pub fn without_native_upsert() -> Self {
        Self {
            native_upsert: false,
            ..Self::new()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 让接下来n次写操作失败
    pub fn fail_next_writes(&self, n: u32) {
        self.fail_next_writes.store(n, Ordering::SeqCst);
    }

    fn check_available(&self) -> SyncResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::VectorStore("目标端不可用".to_string()));
        }
        Ok(())
    }

    async fn check_write(&self) -> SyncResult<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;
        let failed = self
            .fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SyncError::VectorStore("注入的写入失败".to_string()));
        }
        Ok(())
    }

    fn score(metric: MetricType, a: &[f32], b: &[f32]) -> f32 {
        match metric {
            MetricType::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>(),
            MetricType::InnerProduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
            MetricType::Cosine => {
                let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn has_collection(&self, name: &str) -> SyncResult<bool> {
        self.check_available()?;
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> SyncResult<bool> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(name) {
            if existing.dimension != dimension {
                return Err(SyncError::SchemaConflict(format!(
                    "集合{name}已存在且维度不兼容: existing={}, requested={dimension}",
                    existing.dimension
                )));
            }
            return Ok(false);
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                indexes: HashMap::new(),
                records: BTreeMap::new(),
            },
        );
        debug!(collection = %name, dimension, "内存集合已创建");
        Ok(true)
    }

    async fn drop_collection(&self, name: &str) -> SyncResult<bool> {
        self.check_available()?;
        Ok(self.collections.write().await.remove(name).is_some())
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        index_type: &str,
        metric: MetricType,
    ) -> SyncResult<bool> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| SyncError::VectorStore(format!("集合不存在: {collection}")))?;

        if let Some(existing) = coll.indexes.get(field) {
            if existing.index_type != index_type || existing.metric != metric {
                return Err(SyncError::SchemaConflict(format!(
                    "字段{field}已有不兼容索引: existing={}, requested={index_type}",
                    existing.index_type
                )));
            }
            return Ok(false);
        }
        coll.indexes.insert(
            field.to_string(),
            IndexSpec {
                index_type: index_type.to_string(),
                metric,
            },
        );
        Ok(true)
    }

    async fn insert(&self, collection: &str, record: &VectorRecord) -> SyncResult<bool> {
        self.check_write().await?;
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| SyncError::VectorStore(format!("集合不存在: {collection}")))?;
        if record.dimension() != coll.dimension {
            return Err(SyncError::SchemaConflict(format!(
                "向量维度不匹配: collection={}, record={}",
                coll.dimension,
                record.dimension()
            )));
        }
        coll.records.insert(record.primary_key, record.clone());
        Ok(true)
    }

    async fn batch_insert(&self, collection: &str, records: &[VectorRecord]) -> SyncResult<bool> {
        self.check_write().await?;
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| SyncError::VectorStore(format!("集合不存在: {collection}")))?;
        for record in records {
            if record.dimension() != coll.dimension {
                return Err(SyncError::SchemaConflict(format!(
                    "向量维度不匹配: collection={}, record={}",
                    coll.dimension,
                    record.dimension()
                )));
            }
        }
        for record in records {
            coll.records.insert(record.primary_key, record.clone());
        }
        Ok(true)
    }

    async fn upsert(&self, collection: &str, record: &VectorRecord) -> SyncResult<bool> {
        if !self.native_upsert {
            return Err(SyncError::VectorStore(
                "目标不支持原生upsert".to_string(),
            ));
        }
        self.insert(collection, record).await
    }

    async fn delete(&self, collection: &str, primary_key: i64) -> SyncResult<bool> {
        self.check_write().await?;
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| SyncError::VectorStore(format!("集合不存在: {collection}")))?;
        Ok(coll.records.remove(&primary_key).is_some())
    }

    async fn query_by_pk(
        &self,
        collection: &str,
        primary_key: i64,
    ) -> SyncResult<Option<VectorRecord>> {
        self.check_available()?;
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| SyncError::VectorStore(format!("集合不存在: {collection}")))?;
        Ok(coll.records.get(&primary_key).cloned())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        metric: MetricType,
        filter: Option<&str>,
    ) -> SyncResult<Vec<SearchHit>> {
        self.check_available()?;
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| SyncError::VectorStore(format!("集合不存在: {collection}")))?;

        // 过滤表达式只支持 field = value 形式
        let filter = filter
            .map(|f| {
                let (field, value) = f
                    .split_once('=')
                    .ok_or_else(|| SyncError::VectorStore(format!("不支持的过滤表达式: {f}")))?;
                Ok::<_, SyncError>((field.trim().to_string(), value.trim().to_string()))
            })
            .transpose()?;

        let mut hits: Vec<SearchHit> = coll
            .records
            .values()
            .filter(|r| match &filter {
                Some((field, value)) => r
                    .fields
                    .get(field)
                    .map(|v| v.to_string().replace('"', "") == *value)
                    .unwrap_or(false),
                None => true,
            })
            .map(|r| SearchHit {
                primary_key: r.primary_key,
                score: Self::score(metric, vector, &r.vector),
            })
            .collect();

        // L2是距离，越小越相似；其余是相似度，越大越相似
        match metric {
            MetricType::L2 => hits.sort_by(|a, b| a.score.total_cmp(&b.score)),
            _ => hits.sort_by(|a, b| b.score.total_cmp(&a.score)),
        }
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> SyncResult<i64> {
        self.check_available()?;
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| SyncError::VectorStore(format!("集合不存在: {collection}")))?;
        Ok(coll.records.len() as i64)
    }

    async fn stats(&self, collection: &str) -> SyncResult<CollectionStats> {
        self.check_available()?;
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| SyncError::VectorStore(format!("集合不存在: {collection}")))?;
        Ok(CollectionStats {
            name: collection.to_string(),
            dimension: coll.dimension,
            row_count: coll.records.len() as i64,
        })
    }

    fn supports_upsert(&self) -> bool {
        self.native_upsert
    }
}
