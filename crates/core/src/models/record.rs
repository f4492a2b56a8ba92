use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 源端一行数据：列名到值的映射
pub type SourceRow = serde_json::Map<String, Value>;

/// 写入向量库的一条记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// 数值主键，幂等写入的去重依据
    pub primary_key: i64,
    /// 定长数值向量
    pub vector: Vec<f32>,
    /// 标量字段
    pub fields: SourceRow,
}

impl VectorRecord {
    pub fn new(primary_key: i64, vector: Vec<f32>) -> Self {
        Self {
            primary_key,
            vector,
            fields: SourceRow::new(),
        }
    }

    pub fn with_fields(mut self, fields: SourceRow) -> Self {
        self.fields = fields;
        self
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}
