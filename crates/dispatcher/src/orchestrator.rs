use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vecsync_core::models::{ConsistencyReport, FailureNotice, SyncTask, TaskStatus, VectorRecord};
use vecsync_core::schedule::TaskSchedule;
use vecsync_core::traits::TaskRepository;
use vecsync_core::{SyncError, SyncResult};
use vecsync_source::StrategyRegistry;
use vecsync_target::ConsistencyChecker;

use crate::retry::RetryQueue;
use crate::runner::SyncRunner;

/// 进行中运行的句柄：取消信号 + 可等待的受监督future
struct RunHandle {
    cancel: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// 任务编排器
///
/// 独占任务状态机：PENDING → RUNNING → {SUCCESS, FAILED}，PAUSED只
/// 经显式禁用进出。触发的运行是受监督的tokio任务而不是放养的后台
/// 线程：可等待、可取消、完成路径必然落到终态，任务不会卡在
/// RUNNING。运行总量由有界信号量约束。
pub struct TaskOrchestrator {
    repository: Arc<dyn TaskRepository>,
    runner: Arc<SyncRunner>,
    registry: Arc<StrategyRegistry>,
    checker: Arc<ConsistencyChecker>,
    run_pool: Arc<Semaphore>,
    runs: Arc<Mutex<HashMap<i64, RunHandle>>>,
    retry_queue: Option<Arc<RetryQueue>>,
    failure_destination: String,
}

impl TaskOrchestrator {
    pub fn new(
        repository: Arc<dyn TaskRepository>,
        runner: Arc<SyncRunner>,
        registry: Arc<StrategyRegistry>,
        checker: Arc<ConsistencyChecker>,
        run_pool_size: usize,
    ) -> Self {
        Self {
            repository,
            runner,
            registry,
            checker,
            run_pool: Arc::new(Semaphore::new(run_pool_size.max(1))),
            runs: Arc::new(Mutex::new(HashMap::new())),
            retry_queue: None,
            failure_destination: "vecsync.failures".to_string(),
        }
    }

    /// 接入重试队列：运行失败且可重试时发布失败通知并交给重投
    pub fn with_retry_queue<S: Into<String>>(
        mut self,
        retry_queue: Arc<RetryQueue>,
        failure_destination: S,
    ) -> Self {
        self.retry_queue = Some(retry_queue);
        self.failure_destination = failure_destination.into();
        self
    }

    /// 登记新任务：校验调度表达式并计算首次执行时间
    pub async fn create_task(&self, mut task: SyncTask) -> SyncResult<SyncTask> {
        let schedule = TaskSchedule::parse(&task.schedule_type, &task.schedule_expression)?;
        task.next_run_at = schedule.next_run_after(Utc::now());
        let created = self.repository.create(&task).await?;
        info!("{} 已登记", created.entity_description());
        Ok(created)
    }

    /// 触发一次运行
    ///
    /// 返回前任务已同步进入RUNNING；执行本体交给受监督的后台任务，
    /// 完成后落SUCCESS或FAILED并计算下次执行时间。
    pub async fn trigger(&self, task_id: i64) -> SyncResult<()> {
        let task = self
            .repository
            .get_by_id(task_id)
            .await?
            .ok_or(SyncError::TaskNotFound { id: task_id })?;

        if !task.enabled {
            return Err(SyncError::TaskDisabled { id: task_id });
        }
        if !task.status.can_trigger() {
            return Err(SyncError::TaskRunning { id: task_id });
        }

        // CAS失败说明有并发触发者抢先，放弃本次
        let transitioned = self
            .repository
            .compare_and_set_status(task_id, task.status, TaskStatus::Running)
            .await?;
        if !transitioned {
            return Err(SyncError::TaskRunning { id: task_id });
        }

        let mut running = self
            .repository
            .get_by_id(task_id)
            .await?
            .ok_or(SyncError::TaskNotFound { id: task_id })?;
        running.start_time = Some(Utc::now());
        running.end_time = None;
        running.progress = 0;
        running.synced_count = 0;
        running.error_message = None;
        self.repository.update(&running).await?;

        info!("{} 开始运行", running.entity_description());

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let join = self.spawn_supervised(running, cancel_rx);
        self.runs.lock().await.insert(task_id, RunHandle {
            cancel: cancel_tx,
            join,
        });
        Ok(())
    }

    fn spawn_supervised(&self, task: SyncTask, cancel: watch::Receiver<bool>) -> JoinHandle<()> {
        let runner = Arc::clone(&self.runner);
        let repository = Arc::clone(&self.repository);
        let run_pool = Arc::clone(&self.run_pool);
        let runs = Arc::clone(&self.runs);
        let retry_queue = self.retry_queue.clone();
        let failure_destination = self.failure_destination.clone();

        tokio::spawn(async move {
            let task_id = task.id;
            let result = match run_pool.acquire().await {
                Ok(_permit) => runner.run(&task, cancel).await,
                Err(e) => Err(SyncError::Internal(format!("运行池已关闭: {e}"))),
            };

            if let Err(e) =
                Self::finish_run(&repository, &task, &result).await
            {
                error!(task_id, error = %e, "落终态失败");
            }

            if let Err(run_error) = &result {
                if run_error.is_retryable() {
                    if let Some(retry_queue) = retry_queue {
                        let notice = FailureNotice::new(
                            failure_destination,
                            format!("task:{task_id}"),
                            json!({ "task_id": task_id, "error": run_error.to_string() }),
                            run_error.to_string(),
                        );
                        retry_queue.spawn_process(notice);
                    }
                }
            }

            runs.lock().await.remove(&task_id);
        })
    }

    /// 运行结束后的统一收尾：CAS落终态并计算下次执行时间
    ///
    /// 调度表达式解析失败时fail closed：不再排期，任务落FAILED并
    /// 带上描述性错误。
    async fn finish_run(
        repository: &Arc<dyn TaskRepository>,
        task: &SyncTask,
        result: &SyncResult<crate::runner::RunSummary>,
    ) -> SyncResult<()> {
        let now = Utc::now();
        let schedule = TaskSchedule::parse(&task.schedule_type, &task.schedule_expression);

        let (next_status, error_message, next_run_at) = match (result, &schedule) {
            (Ok(_), Ok(schedule)) => (TaskStatus::Success, None, schedule.next_run_after(now)),
            (Ok(_), Err(schedule_error)) => (
                TaskStatus::Failed,
                Some(format!("运行成功但无法排期: {schedule_error}")),
                None,
            ),
            (Err(run_error), Ok(schedule)) => (
                TaskStatus::Failed,
                Some(run_error.to_string()),
                schedule.next_run_after(now),
            ),
            (Err(run_error), Err(_)) => {
                (TaskStatus::Failed, Some(run_error.to_string()), None)
            }
        };

        let transitioned = repository
            .compare_and_set_status(task.id, TaskStatus::Running, next_status)
            .await?;
        if !transitioned {
            // 状态已被他处改写，不覆盖后到的终态
            warn!(task_id = task.id, "运行结束时状态已非RUNNING，跳过收尾");
            return Ok(());
        }

        let mut current = repository
            .get_by_id(task.id)
            .await?
            .ok_or(SyncError::TaskNotFound { id: task.id })?;
        current.end_time = Some(now);
        current.last_exec_time = Some(now);
        current.exec_count += 1;
        current.next_run_at = next_run_at;
        current.error_message = error_message;
        if next_status == TaskStatus::Success {
            current.set_progress(100);
            if let Ok(summary) = result {
                current.synced_count = summary.synced;
                current.total_count = summary.total;
            }
        }
        repository.update(&current).await?;

        let duration_ms = current
            .start_time
            .map(|start| (now - start).num_milliseconds())
            .unwrap_or(0);
        match next_status {
            TaskStatus::Success => info!(
                duration_ms,
                "{} 运行成功", current.entity_description()
            ),
            _ => warn!(
                "{} 运行失败: {}",
                current.entity_description(),
                current.error_message.as_deref().unwrap_or("未知错误")
            ),
        }
        Ok(())
    }

    /// 向在途运行发出取消信号，分片worker在下一个检查点停止
    pub async fn cancel(&self, task_id: i64) -> SyncResult<bool> {
        let runs = self.runs.lock().await;
        match runs.get(&task_id) {
            Some(handle) => {
                let _ = handle.cancel.send(true);
                info!(task_id, "已发出取消信号");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 禁用任务：阻止后续触发；不会追停在途运行
    pub async fn disable(&self, task_id: i64) -> SyncResult<()> {
        let mut task = self
            .repository
            .get_by_id(task_id)
            .await?
            .ok_or(SyncError::TaskNotFound { id: task_id })?;
        task.enabled = false;
        if task.status.can_trigger() {
            task.status = TaskStatus::Paused;
        }
        task.next_run_at = None;
        self.repository.update(&task).await?;
        info!("{} 已禁用", task.entity_description());
        Ok(())
    }

    /// 启用任务并重新计算下次执行时间
    pub async fn enable(&self, task_id: i64) -> SyncResult<()> {
        let mut task = self
            .repository
            .get_by_id(task_id)
            .await?
            .ok_or(SyncError::TaskNotFound { id: task_id })?;
        let schedule = TaskSchedule::parse(&task.schedule_type, &task.schedule_expression)?;
        task.enabled = true;
        if task.status == TaskStatus::Paused {
            task.status = TaskStatus::Pending;
        }
        task.next_run_at = schedule.next_run_after(Utc::now());
        self.repository.update(&task).await?;
        info!("{} 已启用", task.entity_description());
        Ok(())
    }

    /// 扫描到期任务并逐个触发
    ///
    /// 单个任务触发失败不阻断其余任务，返回成功触发的任务id。
    pub async fn run_due_schedules(&self) -> SyncResult<Vec<i64>> {
        let due = self.repository.list_due(Utc::now()).await?;
        let mut triggered = Vec::new();
        for task in due {
            match self.trigger(task.id).await {
                Ok(()) => triggered.push(task.id),
                Err(e) => {
                    warn!(task_id = task.id, error = %e, "到期任务触发失败");
                }
            }
        }
        if !triggered.is_empty() {
            info!(count = triggered.len(), "本轮调度触发完成");
        }
        Ok(triggered)
    }

    /// 对任务做一致性审计：源端计数 + 调用方提供的抽样
    pub async fn verify_task(
        &self,
        task_id: i64,
        sample: &[VectorRecord],
    ) -> SyncResult<ConsistencyReport> {
        let task = self
            .repository
            .get_by_id(task_id)
            .await?
            .ok_or(SyncError::TaskNotFound { id: task_id })?;

        let strategy = self.registry.get(&task.source.dialect)?;
        let connection = strategy.connect(&task.source).await?;
        let count_sql = strategy.build_count_query(&task.table_name, &task.primary_key, None)?;
        let rows = connection.execute_query(&count_sql, &[]).await?;
        connection.close().await;

        let source_count = rows
            .first()
            .and_then(|row| row.get("total").and_then(serde_json::Value::as_i64))
            .unwrap_or(0);

        Ok(self.checker.check(&task, source_count, sample).await)
    }

    /// 等待指定任务的在途运行结束；没有在途运行时立即返回
    pub async fn wait_for_completion(&self, task_id: i64) -> SyncResult<()> {
        let handle = self.runs.lock().await.remove(&task_id);
        if let Some(handle) = handle {
            handle
                .join
                .await
                .map_err(|e| SyncError::Internal(format!("等待运行结束失败: {e}")))?;
        }
        Ok(())
    }

    pub async fn get_task(&self, task_id: i64) -> SyncResult<SyncTask> {
        self.repository
            .get_by_id(task_id)
            .await?
            .ok_or(SyncError::TaskNotFound { id: task_id })
    }
}
