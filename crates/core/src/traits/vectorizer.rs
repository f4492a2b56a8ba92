use async_trait::async_trait;

use crate::models::SourceRow;
use crate::SyncResult;

/// 向量化能力
///
/// 算法本身是外部能力，本核心只要求它对一行数据返回定长数值向量。
#[async_trait]
pub trait Vectorizer: Send + Sync {
    /// 输出向量的固定维度
    fn dimension(&self) -> usize;

    async fn vectorize(&self, row: &SourceRow) -> SyncResult<Vec<f32>>;
}
