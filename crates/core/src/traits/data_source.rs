use async_trait::async_trait;

use crate::models::{SourceConfig, SourceRow};
use crate::SyncResult;

/// 查询的位置参数
///
/// 用户值只能通过参数绑定进入语句，任何实现都不得把它拼进SQL文本，
/// 这是安全不变量而非性能优化。
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

/// 数据源连接句柄
#[async_trait]
pub trait SourceConnection: Send + Sync {
    /// 执行参数化查询
    async fn execute_query(&self, sql: &str, params: &[SqlParam]) -> SyncResult<Vec<SourceRow>>;

    /// 执行参数化更新，返回影响行数
    async fn execute_update(&self, sql: &str, params: &[SqlParam]) -> SyncResult<u64>;

    /// 关闭连接。幂等，不会失败
    async fn close(&self);
}

/// 数据源方言策略
///
/// 按方言字符串注册到StrategyRegistry，进程启动后只读，可并发查找。
/// 新增方言只需新增实现并注册，不改动既有代码。
#[async_trait]
pub trait DataSourceStrategy: Send + Sync {
    /// 方言标识，如"MYSQL"、"POSTGRESQL"
    fn dialect(&self) -> &'static str;

    /// 建立作用域内的连接句柄
    ///
    /// 网络不可达等可重试故障返回Connection错误；凭证错误返回
    /// Authentication错误，后者不会被重试。
    async fn connect(&self, config: &SourceConfig) -> SyncResult<Box<dyn SourceConnection>>;

    /// 渲染分片范围查询
    ///
    /// 输入只有标识符和数值，实现必须校验并引用标识符，保证注入安全；
    /// 结果按主键升序，保证分片内的记录顺序。
    fn build_shard_query(
        &self,
        table: &str,
        pk_column: &str,
        start_id: i64,
        end_id: i64,
    ) -> SyncResult<String>;

    /// 渲染主键边界查询，结果列别名固定为min_id/max_id
    ///
    /// after为增量断点：只统计主键大于该值的行。
    fn build_bounds_query(&self, table: &str, pk_column: &str, after: Option<i64>)
        -> SyncResult<String>;

    /// 渲染行数统计查询，结果列别名固定为total
    fn build_count_query(&self, table: &str, pk_column: &str, after: Option<i64>)
        -> SyncResult<String>;
}
