use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use vecsync_core::models::{SourceConfig, SourceRow};
use vecsync_core::traits::{DataSourceStrategy, SourceConnection, SqlParam};
use vecsync_core::{SyncError, SyncResult};

/// 内存数据源方言
///
/// 查询文本是自有的迷你方言而不是SQL：`scan:{start}:{end}`、
/// `bounds[:after]`、`count[:after]`、`delete:{pk}`。结果列别名
/// 与SQL方言一致（min_id/max_id/total），上层按别名取值即可。
#[derive(Clone)]
pub struct InMemorySourceStrategy {
    rows: Arc<RwLock<BTreeMap<i64, SourceRow>>>,
    query_delay: Option<Duration>,
}

impl InMemorySourceStrategy {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            query_delay: None,
        }
    }

    /// 每次查询前挂起固定时长，用于超时和取消路径的验证
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    pub async fn insert_row(&self, primary_key: i64, row: SourceRow) {
        self.rows.write().await.insert(primary_key, row);
    }

    /// 生成主键1..=n的测试数据，每行带pk列和一个name列
    pub async fn seed(&self, pk_column: &str, n: i64) {
        let mut rows = self.rows.write().await;
        for pk in 1..=n {
            let mut row = SourceRow::new();
            row.insert(pk_column.to_string(), Value::from(pk));
            row.insert("name".to_string(), Value::from(format!("row-{pk}")));
            rows.insert(pk, row);
        }
    }

    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }
}

impl Default for InMemorySourceStrategy {
    fn default() -> Self {
        Self::new()
    }
}

struct InMemorySourceConnection {
    rows: Arc<RwLock<BTreeMap<i64, SourceRow>>>,
    query_delay: Option<Duration>,
}

impl InMemorySourceConnection {
    fn parse_i64(raw: &str, context: &str) -> SyncResult<i64> {
        raw.parse::<i64>()
            .map_err(|_| SyncError::Database(format!("非法的{context}: {raw}")))
    }
}

#[async_trait]
impl SourceConnection for InMemorySourceConnection {
    async fn execute_query(&self, sql: &str, _params: &[SqlParam]) -> SyncResult<Vec<SourceRow>> {
        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }
        debug!(query = %sql, "执行内存源查询");
        let rows = self.rows.read().await;

        let mut parts = sql.split(':');
        match parts.next() {
            Some("scan") => {
                let start = Self::parse_i64(parts.next().unwrap_or(""), "起始主键")?;
                let end = Self::parse_i64(parts.next().unwrap_or(""), "结束主键")?;
                Ok(rows.range(start..=end).map(|(_, r)| r.clone()).collect())
            }
            Some("bounds") => {
                let after = parts
                    .next()
                    .map(|raw| Self::parse_i64(raw, "断点"))
                    .transpose()?;
                let mut keys = rows.keys().copied();
                let (min, max) = match after {
                    Some(after) => {
                        let mut filtered = keys.filter(|k| *k > after);
                        let min = filtered.next();
                        (min, filtered.last().or(min))
                    }
                    None => {
                        let min = keys.next();
                        (min, keys.last().or(min))
                    }
                };
                let mut row = SourceRow::new();
                row.insert("min_id".to_string(), min.map(Value::from).unwrap_or(Value::Null));
                row.insert("max_id".to_string(), max.map(Value::from).unwrap_or(Value::Null));
                Ok(vec![row])
            }
            Some("count") => {
                let after = parts
                    .next()
                    .map(|raw| Self::parse_i64(raw, "断点"))
                    .transpose()?;
                let total = match after {
                    Some(after) => rows.keys().filter(|k| **k > after).count(),
                    None => rows.len(),
                };
                let mut row = SourceRow::new();
                row.insert("total".to_string(), Value::from(total as i64));
                Ok(vec![row])
            }
            _ => Err(SyncError::Database(format!("不支持的内存源查询: {sql}"))),
        }
    }

    async fn execute_update(&self, sql: &str, _params: &[SqlParam]) -> SyncResult<u64> {
        let mut parts = sql.split(':');
        match parts.next() {
            Some("delete") => {
                let pk = Self::parse_i64(parts.next().unwrap_or(""), "主键")?;
                let removed = self.rows.write().await.remove(&pk).is_some();
                Ok(u64::from(removed))
            }
            _ => Err(SyncError::Database(format!("不支持的内存源更新: {sql}"))),
        }
    }

    async fn close(&self) {}
}

#[async_trait]
impl DataSourceStrategy for InMemorySourceStrategy {
    fn dialect(&self) -> &'static str {
        "MEMORY"
    }

    async fn connect(&self, _config: &SourceConfig) -> SyncResult<Box<dyn SourceConnection>> {
        Ok(Box::new(InMemorySourceConnection {
            rows: Arc::clone(&self.rows),
            query_delay: self.query_delay,
        }))
    }

    fn build_shard_query(
        &self,
        _table: &str,
        _pk_column: &str,
        start_id: i64,
        end_id: i64,
    ) -> SyncResult<String> {
        Ok(format!("scan:{start_id}:{end_id}"))
    }

    fn build_bounds_query(
        &self,
        _table: &str,
        _pk_column: &str,
        after: Option<i64>,
    ) -> SyncResult<String> {
        Ok(match after {
            Some(after) => format!("bounds:{after}"),
            None => "bounds".to_string(),
        })
    }

    fn build_count_query(
        &self,
        _table: &str,
        _pk_column: &str,
        after: Option<i64>,
    ) -> SyncResult<String> {
        Ok(match after {
            Some(after) => format!("count:{after}"),
            None => "count".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vecsync_core::models::SourceConfig;

    async fn seeded(n: i64) -> InMemorySourceStrategy {
        let strategy = InMemorySourceStrategy::new();
        strategy.seed("id", n).await;
        strategy
    }

    #[tokio::test]
    async fn test_scan_returns_range_in_order() {
        let strategy = seeded(10).await;
        let conn = strategy.connect(&SourceConfig::default()).await.unwrap();
        let sql = strategy.build_shard_query("t", "id", 3, 7).unwrap();
        let rows = conn.execute_query(&sql, &[]).await.unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].get("id"), Some(&Value::from(3)));
        assert_eq!(rows[4].get("id"), Some(&Value::from(7)));
    }

    #[tokio::test]
    async fn test_bounds_and_count_aliases() {
        let strategy = seeded(100).await;
        let conn = strategy.connect(&SourceConfig::default()).await.unwrap();

        let rows = conn.execute_query("bounds", &[]).await.unwrap();
        assert_eq!(rows[0].get("min_id"), Some(&Value::from(1)));
        assert_eq!(rows[0].get("max_id"), Some(&Value::from(100)));

        let rows = conn.execute_query("count", &[]).await.unwrap();
        assert_eq!(rows[0].get("total"), Some(&Value::from(100)));
    }

    #[tokio::test]
    async fn test_bounds_with_cursor_skips_synced_rows() {
        let strategy = seeded(100).await;
        let conn = strategy.connect(&SourceConfig::default()).await.unwrap();

        let rows = conn.execute_query("bounds:80", &[]).await.unwrap();
        assert_eq!(rows[0].get("min_id"), Some(&Value::from(81)));
        assert_eq!(rows[0].get("max_id"), Some(&Value::from(100)));

        let rows = conn.execute_query("count:80", &[]).await.unwrap();
        assert_eq!(rows[0].get("total"), Some(&Value::from(20)));
    }

    #[tokio::test]
    async fn test_empty_source_bounds_are_null() {
        let strategy = InMemorySourceStrategy::new();
        let conn = strategy.connect(&SourceConfig::default()).await.unwrap();
        let rows = conn.execute_query("bounds", &[]).await.unwrap();
        assert_eq!(rows[0].get("min_id"), Some(&Value::Null));
        assert_eq!(rows[0].get("max_id"), Some(&Value::Null));
    }
}
