use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::VectorRecord;
use crate::SyncResult;

/// 向量相似度度量
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MetricType {
    #[serde(rename = "L2")]
    L2,
    #[serde(rename = "IP")]
    InnerProduct,
    #[serde(rename = "COSINE")]
    Cosine,
}

/// 向量检索命中
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub primary_key: i64,
    pub score: f32,
}

/// 集合统计信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub dimension: usize,
    pub row_count: i64,
}

/// 向量库边界
///
/// 所有写操作返回bool成功信号；batch_insert只报告整批成败，
/// 不提供部分成功语义，逐条降级由调用方决定。
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn has_collection(&self, name: &str) -> SyncResult<bool>;

    /// 创建集合。同名同维度的已存在集合返回Ok(false)（幂等空操作）；
    /// 维度不兼容时返回SchemaConflict。
    async fn create_collection(&self, name: &str, dimension: usize) -> SyncResult<bool>;

    async fn drop_collection(&self, name: &str) -> SyncResult<bool>;

    /// 创建索引。兼容的已有索引返回Ok(false)；类型冲突返回SchemaConflict。
    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        index_type: &str,
        metric: MetricType,
    ) -> SyncResult<bool>;

    async fn insert(&self, collection: &str, record: &VectorRecord) -> SyncResult<bool>;

    async fn batch_insert(&self, collection: &str, records: &[VectorRecord]) -> SyncResult<bool>;

    /// 按主键覆盖写。仅在supports_upsert为true时可用
    async fn upsert(&self, collection: &str, record: &VectorRecord) -> SyncResult<bool>;

    async fn delete(&self, collection: &str, primary_key: i64) -> SyncResult<bool>;

    /// 标量查询：按主键取回记录
    async fn query_by_pk(
        &self,
        collection: &str,
        primary_key: i64,
    ) -> SyncResult<Option<VectorRecord>>;

    /// Top-K向量检索，filter为可选的标量过滤表达式
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        metric: MetricType,
        filter: Option<&str>,
    ) -> SyncResult<Vec<SearchHit>>;

    async fn count(&self, collection: &str) -> SyncResult<i64>;

    async fn stats(&self, collection: &str) -> SyncResult<CollectionStats>;

    /// 目标是否原生支持upsert；否则幂等写走delete-then-insert
    fn supports_upsert(&self) -> bool;
}
