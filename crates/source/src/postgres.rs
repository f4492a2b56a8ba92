use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::{Column, Row};
use tracing::debug;
use vecsync_core::models::{SourceConfig, SourceRow};
use vecsync_core::traits::{DataSourceStrategy, SourceConnection, SqlParam};
use vecsync_core::{SyncError, SyncResult};

use crate::ident::validate_identifier;

/// PostgreSQL方言实现
///
/// 标识符用双引号引用，其余行为与MySQL实现一致。
pub struct PostgresStrategy;

impl PostgresStrategy {
    pub fn new() -> Self {
        Self
    }

    fn quote(ident: &str) -> String {
        format!("\"{ident}\"")
    }
}

impl Default for PostgresStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_connect_error(e: sqlx::Error) -> SyncError {
    if let sqlx::Error::Database(db) = &e {
        // 28P01=密码错误，28000=授权失败
        if matches!(db.code().as_deref(), Some("28P01") | Some("28000")) {
            return SyncError::Authentication(format!("PostgreSQL认证失败: {e}"));
        }
    }
    SyncError::Connection(format!("PostgreSQL连接失败: {e}"))
}

fn bind_params<'q>(
    sql: &'q str,
    params: &'q [SqlParam],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query::<Postgres>(sql);
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

fn row_to_source_row(row: &PgRow) -> SourceRow {
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

pub struct PostgresSourceConnection {
    pool: PgPool,
}

#[async_trait]
impl SourceConnection for PostgresSourceConnection {
    async fn execute_query(&self, sql: &str, params: &[SqlParam]) -> SyncResult<Vec<SourceRow>> {
        debug!(sql = %sql, params = params.len(), "执行PostgreSQL查询");
        let rows = bind_params(sql, params).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_source_row).collect())
    }

    async fn execute_update(&self, sql: &str, params: &[SqlParam]) -> SyncResult<u64> {
        debug!(sql = %sql, params = params.len(), "执行PostgreSQL更新");
        let result = bind_params(sql, params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DataSourceStrategy for PostgresStrategy {
    fn dialect(&self) -> &'static str {
        "POSTGRESQL"
    }

    async fn connect(&self, config: &SourceConfig) -> SyncResult<Box<dyn SourceConnection>> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .password(&config.password);

        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(classify_connect_error)?;

        Ok(Box::new(PostgresSourceConnection { pool }))
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
