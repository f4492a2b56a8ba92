use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};
use vecsync_core::models::{SourceRow, SyncTask, VectorRecord};
use vecsync_core::traits::{CursorStore, MetricType, SourceConnection, TaskRepository, Vectorizer};
use vecsync_core::{ShardPlanner, ShardRange, SyncError, SyncResult};
use vecsync_source::StrategyRegistry;
use vecsync_target::SyncWriter;

/// 目标集合里的向量字段名
const VECTOR_FIELD: &str = "vector";
/// 默认索引类型
const DEFAULT_INDEX_TYPE: &str = "IVF_FLAT";

/// 一次运行的结果摘要
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// 本次写入的记录数
    pub synced: i64,
    /// 本次待同步的总记录数
    pub total: i64,
    /// 扫描到的最大主键，增量任务以此推进断点
    pub max_id: Option<i64>,
}

/// 同步运行执行器
///
/// 执行一次完整的同步运行：解析方言建连、取主键边界、分片、并发
/// 抽取+向量化+幂等写入、推进断点。分片失败会使整次运行失败，
/// 分片完成顺序不保证，主键幂等写使乱序安全。
pub struct SyncRunner {
    registry: Arc<StrategyRegistry>,
    writer: Arc<SyncWriter>,
    vectorizer: Arc<dyn Vectorizer>,
    repository: Arc<dyn TaskRepository>,
    cursors: Arc<dyn CursorStore>,
    heartbeat_ttl: Duration,
    query_timeout: Duration,
}

impl SyncRunner {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        writer: Arc<SyncWriter>,
        vectorizer: Arc<dyn Vectorizer>,
        repository: Arc<dyn TaskRepository>,
        cursors: Arc<dyn CursorStore>,
    ) -> Self {
        Self {
            registry,
            writer,
            vectorizer,
            repository,
            cursors,
            heartbeat_ttl: Duration::from_secs(30),
            query_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_heartbeat_ttl(mut self, ttl: Duration) -> Self {
        self.heartbeat_ttl = ttl;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// 源端查询的超时上限，挂死的扫描不会无界阻塞整次运行
    async fn bounded_query(
        connection: &Arc<dyn SourceConnection>,
        sql: &str,
        timeout: Duration,
    ) -> SyncResult<Vec<SourceRow>> {
        tokio::time::timeout(timeout, connection.execute_query(sql, &[]))
            .await
            .map_err(|_| {
                SyncError::Timeout(format!(
                    "源查询超时: sql={sql}, timeout={}ms",
                    timeout.as_millis()
                ))
            })?
    }

    /// 执行一次同步运行，cancel信号在分片边界生效
    pub async fn run(
        &self,
        task: &SyncTask,
        cancel: watch::Receiver<bool>,
    ) -> SyncResult<RunSummary> {
        if self.vectorizer.dimension() != task.dimension {
            return Err(SyncError::Configuration(format!(
                "向量化维度与任务不一致: vectorizer={}, task={}",
                self.vectorizer.dimension(),
                task.dimension
            )));
        }

        let strategy = self.registry.get(&task.source.dialect)?;
        let connection: Arc<dyn SourceConnection> =
            Arc::from(strategy.connect(&task.source).await?);

        self.cursors
            .set(
                &task.heartbeat_key(),
                &Utc::now().to_rfc3339(),
                Some(self.heartbeat_ttl),
            )
            .await?;

        // 增量任务从断点之后继续
        let after = if task.is_incremental() {
            let cursor = self.cursors.get(&task.breakpoint_key()).await?;
            cursor.and_then(|raw| raw.parse::<i64>().ok())
        } else {
            None
        };

        let bounds_sql = strategy.build_bounds_query(&task.table_name, &task.primary_key, after)?;
        let bounds = Self::bounded_query(&connection, &bounds_sql, self.query_timeout).await?;
        let (min_id, max_id) = bounds
            .first()
            .map(|row| {
                (
                    row.get("min_id").and_then(Value::as_i64),
                    row.get("max_id").and_then(Value::as_i64),
                )
            })
            .unwrap_or((None, None));

        let (min_id, max_id) = match (min_id, max_id) {
            (Some(min), Some(max)) => (min, max),
            _ => {
                info!(task_id = task.id, "源端无待同步数据");
                connection.close().await;
                let _ = self.cursors.delete(&task.heartbeat_key()).await;
                return Ok(RunSummary {
                    synced: 0,
                    total: 0,
                    max_id: None,
                });
            }
        };

        let count_sql = strategy.build_count_query(&task.table_name, &task.primary_key, after)?;
        let count_rows = Self::bounded_query(&connection, &count_sql, self.query_timeout).await?;
        let total = count_rows
            .first()
            .and_then(|row| row.get("total").and_then(Value::as_i64))
            .unwrap_or(0);

        self.writer
            .ensure_collection(&task.collection, task.dimension)
            .await?;
        self.writer
            .ensure_index(
                &task.collection,
                VECTOR_FIELD,
                DEFAULT_INDEX_TYPE,
                MetricType::Cosine,
            )
            .await?;

        let plan = ShardPlanner::plan(min_id, max_id, task.concurrency)?;
        info!(
            task_id = task.id,
            min_id,
            max_id,
            total,
            shards = plan.len(),
            "分片计划就绪"
        );

        let semaphore = Arc::new(Semaphore::new(task.concurrency.max(1) as usize));
        let synced = Arc::new(AtomicI64::new(0));
        let mut handles = Vec::with_capacity(plan.len());

        for shard in plan {
            // 取消信号在分片边界生效：不再派发新分片
            if *cancel.borrow() {
                break;
            }
            let sql = strategy.build_shard_query(
                &task.table_name,
                &task.primary_key,
                shard.start_id,
                shard.end_id,
            )?;
            handles.push(tokio::spawn(Self::run_shard(ShardContext {
                task_id: task.id,
                shard,
                sql,
                pk_column: task.primary_key.clone(),
                collection: task.collection.clone(),
                batch_size: task.batch_size.max(1),
                total,
                heartbeat_key: task.heartbeat_key(),
                heartbeat_ttl: self.heartbeat_ttl,
                query_timeout: self.query_timeout,
                cursors: Arc::clone(&self.cursors),
                connection: Arc::clone(&connection),
                writer: Arc::clone(&self.writer),
                vectorizer: Arc::clone(&self.vectorizer),
                repository: Arc::clone(&self.repository),
                semaphore: Arc::clone(&semaphore),
                synced: Arc::clone(&synced),
                cancel: cancel.clone(),
            })));
        }

        let cancelled_early = *cancel.borrow();
        let mut first_error: Option<SyncError> = None;
        for outcome in join_all(handles).await {
            match outcome {
                Ok(Ok(written)) => {
                    debug!(task_id = task.id, written, "分片完成");
                }
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(SyncError::Internal(format!("分片worker崩溃: {e}")));
                    }
                }
            }
        }

        connection.close().await;
        let _ = self.cursors.delete(&task.heartbeat_key()).await;

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancelled_early {
            return Err(SyncError::Cancelled { id: task.id });
        }

        // 全部分片成功后才推进断点，失败重跑会覆盖已写记录
        if task.is_incremental() {
            self.cursors
                .set(&task.breakpoint_key(), &max_id.to_string(), None)
                .await?;
        }

        Ok(RunSummary {
            synced: synced.load(Ordering::SeqCst),
            total,
            max_id: Some(max_id),
        })
    }

    async fn run_shard(ctx: ShardContext) -> SyncResult<i64> {
        let _permit = ctx
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SyncError::Internal(format!("获取分片信号量失败: {e}")))?;

        if *ctx.cancel.borrow() {
            return Err(SyncError::Cancelled { id: ctx.task_id });
        }

        // 每个分片开工时续约心跳，长运行不会在TTL内被误判死亡
        ctx.refresh_heartbeat().await;

        let rows = Self::bounded_query(&ctx.connection, &ctx.sql, ctx.query_timeout).await?;
        debug!(
            task_id = ctx.task_id,
            start_id = ctx.shard.start_id,
            end_id = ctx.shard.end_id,
            rows = rows.len(),
            "分片抽取完成"
        );

        let mut batch: Vec<VectorRecord> = Vec::with_capacity(ctx.batch_size);
        let mut written = 0i64;
        for row in rows {
            let pk = row
                .get(&ctx.pk_column)
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    SyncError::Database(format!(
                        "主键列{}缺失或不是整数: task={}, shard=[{}, {}]",
                        ctx.pk_column, ctx.task_id, ctx.shard.start_id, ctx.shard.end_id
                    ))
                })?;
            let vector = ctx.vectorizer.vectorize(&row).await?;
            batch.push(VectorRecord::new(pk, vector).with_fields(row));

            if batch.len() >= ctx.batch_size {
                written += ctx.flush(&mut batch).await?;
                // 批间检查点
                if *ctx.cancel.borrow() {
                    return Err(SyncError::Cancelled { id: ctx.task_id });
                }
            }
        }
        written += ctx.flush(&mut batch).await?;
        Ok(written)
    }
}

struct ShardContext {
    task_id: i64,
    shard: ShardRange,
    sql: String,
    pk_column: String,
    collection: String,
    batch_size: usize,
    total: i64,
    heartbeat_key: String,
    heartbeat_ttl: Duration,
    query_timeout: Duration,
    cursors: Arc<dyn CursorStore>,
    connection: Arc<dyn SourceConnection>,
    writer: Arc<SyncWriter>,
    vectorizer: Arc<dyn Vectorizer>,
    repository: Arc<dyn TaskRepository>,
    semaphore: Arc<Semaphore>,
    synced: Arc<AtomicI64>,
    cancel: watch::Receiver<bool>,
}

impl ShardContext {
    /// 心跳续约是尽力而为的，失败只记日志不影响分片
    async fn refresh_heartbeat(&self) {
        if let Err(e) = self
            .cursors
            .set(
                &self.heartbeat_key,
                &Utc::now().to_rfc3339(),
                Some(self.heartbeat_ttl),
            )
            .await
        {
            warn!(task_id = self.task_id, error = %e, "心跳续约失败");
        }
    }

    /// 整批写入，失败时逐条幂等降级；两者都失败则分片失败
    async fn flush(&self, batch: &mut Vec<VectorRecord>) -> SyncResult<i64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let records = std::mem::take(batch);
        let count = match self.writer.batch_write(&self.collection, &records).await {
            Ok(true) => records.len(),
            Ok(false) | Err(_) => {
                warn!(
                    task_id = self.task_id,
                    count = records.len(),
                    "整批写入失败，降级为逐条幂等写"
                );
                self.writer.write_each(&self.collection, &records).await?
            }
        };
        self.report_progress(count as i64).await;
        Ok(count as i64)
    }

    /// 进度是last-writer-wins的计数，写失败只记日志不影响运行
    async fn report_progress(&self, just_written: i64) {
        // 批间也续约，跨多批的大分片同样不掉心跳
        self.refresh_heartbeat().await;
        let done = self.synced.fetch_add(just_written, Ordering::SeqCst) + just_written;
        let progress = if self.total > 0 {
            ((done * 100) / self.total).min(100) as i32
        } else {
            100
        };
        if let Err(e) = self
            .repository
            .update_progress(self.task_id, progress, done, self.total)
            .await
        {
            warn!(task_id = self.task_id, error = %e, "进度更新失败");
        }
    }
}
