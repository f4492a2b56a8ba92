use std::sync::Arc;

use tracing::{debug, warn};
use vecsync_core::models::{ConsistencyReport, SyncTask, VectorRecord};
use vecsync_core::traits::VectorStore;

/// 一致性校验器
///
/// 纯比对逻辑：抽样由调用方提供，这里只负责计数比对和逐条回查。
/// 漂移作为报告数据返回，目标端不可用也不向上抛错。
pub struct ConsistencyChecker {
    store: Arc<dyn VectorStore>,
}

impl ConsistencyChecker {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// 校验：计数比对 + 抽样回查
    ///
    /// consistent = 计数一致 且 抽样全部通过。
    pub async fn check(
        &self,
        task: &SyncTask,
        source_count: i64,
        sample: &[VectorRecord],
    ) -> ConsistencyReport {
        let target_count = match self.store.count(&task.collection).await {
            Ok(count) => count,
            Err(e) => {
                warn!(task_id = task.id, collection = %task.collection, error = %e, "目标端不可用，校验降级");
                return ConsistencyReport::unavailable(source_count, e.to_string());
            }
        };

        let mut discrepancies = Vec::new();
        if source_count != target_count {
            discrepancies.push(format!(
                "记录数不一致: source={source_count}, target={target_count}, delta={}",
                source_count - target_count
            ));
        }

        let mut sample_passed = 0usize;
        for expected in sample {
            match self.store.query_by_pk(&task.collection, expected.primary_key).await {
                Ok(Some(actual)) => {
                    if let Some(diff) = Self::compare_record(expected, &actual) {
                        discrepancies.push(diff);
                    } else {
                        sample_passed += 1;
                    }
                }
                Ok(None) => {
                    discrepancies.push(format!("主键{}在目标中不存在", expected.primary_key));
                }
                Err(e) => {
                    discrepancies.push(format!("主键{}回查失败: {e}", expected.primary_key));
                }
            }
        }

        let counts_match = source_count == target_count;
        let all_samples_match = sample_passed == sample.len();
        let report = ConsistencyReport {
            consistent: counts_match && all_samples_match,
            source_count,
            target_count,
            sample_checked: sample.len(),
            sample_passed,
            discrepancies,
            error_message: None,
        };

        debug!(
            task_id = task.id,
            consistent = report.consistent,
            sample_checked = report.sample_checked,
            sample_passed = report.sample_passed,
            "一致性校验完成"
        );
        report
    }

    /// 比对单条记录：向量维度 + 抽样记录携带的标量字段子集
    fn compare_record(expected: &VectorRecord, actual: &VectorRecord) -> Option<String> {
        if expected.dimension() != actual.dimension() {
            return Some(format!(
                "主键{}向量维度不一致: expected={}, actual={}",
                expected.primary_key,
                expected.dimension(),
                actual.dimension()
            ));
        }

        for (key, value) in &expected.fields {
            match actual.fields.get(key) {
                Some(actual_value) if actual_value == value => {}
                Some(actual_value) => {
                    return Some(format!(
                        "主键{}字段{key}不一致: expected={value}, actual={actual_value}",
                        expected.primary_key
                    ));
                }
                None => {
                    return Some(format!("主键{}缺少字段{key}", expected.primary_key));
                }
            }
        }
        None
    }
}
