use serde::{Deserialize, Serialize};

/// 一致性校验报告
///
/// 每次审计生成一份，生成后不可变；漂移以数据形式上报，不作为错误抛出。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub source_count: i64,
    pub target_count: i64,
    /// 实际抽样比对的记录数
    pub sample_checked: usize,
    /// 抽样比对通过的记录数
    pub sample_passed: usize,
    pub discrepancies: Vec<String>,
    /// 目标端不可用等导致校验未完成时的错误描述
    pub error_message: Option<String>,
}

impl ConsistencyReport {
    /// 目标端不可用时的降级报告：不抛错，sample_checked为0
    pub fn unavailable(source_count: i64, error: String) -> Self {
        Self {
            consistent: false,
            source_count,
            target_count: 0,
            sample_checked: 0,
            sample_passed: 0,
            discrepancies: Vec::new(),
            error_message: Some(error),
        }
    }

    pub fn count_delta(&self) -> i64 {
        self.source_count - self.target_count
    }
}
