use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlDatabaseError, MySqlPool, MySqlPoolOptions,
    MySqlRow,
};
use sqlx::{Column, Row};
use tracing::debug;
use vecsync_core::models::{SourceConfig, SourceRow};
use vecsync_core::traits::{DataSourceStrategy, SourceConnection, SqlParam};
use vecsync_core::{SyncError, SyncResult};

use crate::ident::validate_identifier;

/// MySQL方言实现
///
/// 标识符用反引号引用；范围边界是i64，直接内联；其余值走参数绑定。
pub struct MySqlStrategy;

/// MySQL拒绝访问错误码
const ER_ACCESS_DENIED: u16 = 1045;

impl MySqlStrategy {
    pub fn new() -> Self {
        Self
    }

    fn quote(ident: &str) -> String {
        format!("`{ident}`")
    }
}

impl Default for MySqlStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// 建连失败的分类：凭证错误不可重试，网络类故障可重试
fn classify_connect_error(e: sqlx::Error) -> SyncError {
    if let sqlx::Error::Database(db) = &e {
        let denied = db
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|my| my.number() == ER_ACCESS_DENIED)
            .unwrap_or(false);
        if denied || db.code().as_deref() == Some("28000") {
            return SyncError::Authentication(format!("MySQL认证失败: {e}"));
        }
    }
    SyncError::Connection(format!("MySQL连接失败: {e}"))
}

fn bind_params<'q>(
    sql: &'q str,
    params: &'q [SqlParam],
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    let mut query = sqlx::query::<MySql>(sql);
    for param in params {
        query = match param {
            SqlParam::Int(v) => query.bind(v),
            SqlParam::Float(v) => query.bind(v),
            SqlParam::Text(v) => query.bind(v),
            SqlParam::Bool(v) => query.bind(v),
            SqlParam::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

/// 按i64/f64/bool/字符串的顺序尝试解码，全部失败记为Null
fn row_to_source_row(row: &MySqlRow) -> SourceRow {
    let mut out = SourceRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        out.insert(column.name().to_string(), value);
    }
    out
}

/// 连接池包装，生命周期由调用方作用域控制
pub struct MySqlSourceConnection {
    pool: MySqlPool,
}

#[async_trait]
impl SourceConnection for MySqlSourceConnection {
    async fn execute_query(&self, sql: &str, params: &[SqlParam]) -> SyncResult<Vec<SourceRow>> {
        debug!(sql = %sql, params = params.len(), "执行MySQL查询");
        let rows = bind_params(sql, params).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_source_row).collect())
    }

    async fn execute_update(&self, sql: &str, params: &[SqlParam]) -> SyncResult<u64> {
        debug!(sql = %sql, params = params.len(), "执行MySQL更新");
        let result = bind_params(sql, params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DataSourceStrategy for MySqlStrategy {
    fn dialect(&self) -> &'static str {
        "MYSQL"
    }

    async fn connect(&self, config: &SourceConfig) -> SyncResult<Box<dyn SourceConnection>> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .password(&config.password);

        let pool = MySqlPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(classify_connect_error)?;

        Ok(Box::new(MySqlSourceConnection { pool }))
    }

    fn build_shard_query(
        &self,
        table: &str,
        pk_column: &str,
        start_id: i64,
        end_id: i64,
    ) -> SyncResult<String> {
        validate_identifier(table)?;
        validate_identifier(pk_column)?;
        let table = Self::quote(table);
        let pk = Self::quote(pk_column);
        Ok(format!(
            "SELECT * FROM {table} WHERE {pk} >= {start_id} AND {pk} <= {end_id} ORDER BY {pk} ASC"
        ))
    }

    fn build_bounds_query(
        &self,
        table: &str,
        pk_column: &str,
        after: Option<i64>,
    ) -> SyncResult<String> {
        validate_identifier(table)?;
        validate_identifier(pk_column)?;
        let table = Self::quote(table);
        let pk = Self::quote(pk_column);
        let mut sql = format!("SELECT MIN({pk}) AS min_id, MAX({pk}) AS max_id FROM {table}");
        if let Some(after) = after {
            sql.push_str(&format!(" WHERE {pk} > {after}"));
        }
        Ok(sql)
    }

    fn build_count_query(
        &self,
        table: &str,
        pk_column: &str,
        after: Option<i64>,
    ) -> SyncResult<String> {
        validate_identifier(table)?;
        validate_identifier(pk_column)?;
        let table = Self::quote(table);
        let pk = Self::quote(pk_column);
        let mut sql = format!("SELECT COUNT({pk}) AS total FROM {table}");
        if let Some(after) = after {
            sql.push_str(&format!(" WHERE {pk} > {after}"));
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_query_orders_by_pk() {
        let strategy = MySqlStrategy::new();
        let sql = strategy.build_shard_query("users", "id", 1, 250).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM `users` WHERE `id` >= 1 AND `id` <= 250 ORDER BY `id` ASC"
        );
    }

    #[test]
    fn test_bounds_query_aliases() {
        let strategy = MySqlStrategy::new();
        let sql = strategy.build_bounds_query("users", "id", None).unwrap();
        assert_eq!(sql, "SELECT MIN(`id`) AS min_id, MAX(`id`) AS max_id FROM `users`");

        let sql = strategy.build_bounds_query("users", "id", Some(500)).unwrap();
        assert_eq!(
            sql,
            "SELECT MIN(`id`) AS min_id, MAX(`id`) AS max_id FROM `users` WHERE `id` > 500"
        );
    }

    #[test]
    fn test_count_query() {
        let strategy = MySqlStrategy::new();
        let sql = strategy.build_count_query("orders", "order_id", None).unwrap();
        assert_eq!(sql, "SELECT COUNT(`order_id`) AS total FROM `orders`");
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let strategy = MySqlStrategy::new();
        assert!(strategy
            .build_shard_query("users; DROP TABLE users", "id", 1, 2)
            .is_err());
        assert!(strategy.build_bounds_query("users", "id`--", None).is_err());
        assert!(strategy.build_count_query("1users", "id", None).is_err());
    }
}
