use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use vecsync_core::models::SourceRow;
use vecsync_core::traits::Vectorizer;
use vecsync_core::{SyncError, SyncResult};

/// 基于哈希的确定性向量化
///
/// 不是真正的语义嵌入：把整行序列化后与维度下标一起哈希，映射到
/// [0,1)。同一行永远产出同一向量，一致性抽样比对因此可以做精确
/// 相等判断。
pub struct HashingVectorizer {
    dimension: usize,
}

impl HashingVectorizer {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Vectorizer for HashingVectorizer {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn vectorize(&self, row: &SourceRow) -> SyncResult<Vec<f32>> {
        let serialized = serde_json::to_string(row)
            .map_err(|e| SyncError::Serialization(format!("序列化源行失败: {e}")))?;

        let mut vector = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let mut hasher = DefaultHasher::new();
            serialized.hash(&mut hasher);
            i.hash(&mut hasher);
            let bucket = hasher.finish() % 10_000;
            vector.push(bucket as f32 / 10_000.0);
        }
        Ok(vector)
    }
}
