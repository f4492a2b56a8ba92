use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::source::SourceConfig;

/// 同步任务类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskType {
    /// 全量同步
    #[serde(rename = "FULL")]
    Full,
    /// 增量同步（基于断点位点）
    #[serde(rename = "INCREMENTAL")]
    Incremental,
    /// 先全量后增量
    #[serde(rename = "FULL_AND_INCREMENTAL")]
    FullAndIncremental,
}

/// 任务状态机：PENDING → RUNNING → {SUCCESS, FAILED}
///
/// PAUSED 只能通过显式禁用进入，通过显式启用离开。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "PAUSED")]
    Paused,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Paused => "PAUSED",
        }
    }

    /// 是否允许从当前状态触发一次新的运行
    pub fn can_trigger(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Success | TaskStatus::Failed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

/// 调度类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScheduleType {
    /// CRON表达式（cron crate的秒级六/七段语法）
    #[serde(rename = "CRON")]
    Cron,
    /// 固定间隔（表达式为秒数）
    #[serde(rename = "INTERVAL")]
    Interval,
}

/// 同步任务定义与运行时状态
///
/// 字段由TaskOrchestrator独占修改；进度计数采用last-writer-wins，
/// 状态迁移必须走仓储层的compare-and-swap。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: i64,
    /// 任务名称（唯一）
    pub name: String,
    pub task_type: TaskType,
    /// 源端连接配置
    pub source: SourceConfig,
    /// 源表名
    pub table_name: String,
    /// 数值主键列
    pub primary_key: String,
    /// 目标集合名
    pub collection: String,
    /// 向量维度
    pub dimension: usize,
    /// 分片并发因子
    pub concurrency: i64,
    /// 单批写入条数
    pub batch_size: usize,
    /// 写失败的最大重试次数
    pub max_retries: u32,
    /// 调度类型字符串（"CRON"/"INTERVAL"，未知类型调度时fail closed）
    pub schedule_type: String,
    pub schedule_expression: String,
    pub enabled: bool,
    pub status: TaskStatus,
    /// 进度百分比，0..=100
    pub progress: i32,
    pub synced_count: i64,
    pub total_count: i64,
    /// 累计执行次数
    pub exec_count: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_exec_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncTask {
    pub fn new(name: String, task_type: TaskType, source: SourceConfig) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 由仓储层分配
            name,
            task_type,
            source,
            table_name: String::new(),
            primary_key: "id".to_string(),
            collection: String::new(),
            dimension: 128,
            concurrency: 1,
            batch_size: 1000,
            max_retries: 3,
            schedule_type: "INTERVAL".to_string(),
            schedule_expression: "300".to_string(),
            enabled: true,
            status: TaskStatus::Pending,
            progress: 0,
            synced_count: 0,
            total_count: 0,
            exec_count: 0,
            start_time: None,
            end_time: None,
            next_run_at: None,
            last_exec_time: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_incremental(&self) -> bool {
        matches!(
            self.task_type,
            TaskType::Incremental | TaskType::FullAndIncremental
        )
    }

    /// 进度值夹取到有效区间
    pub fn set_progress(&mut self, progress: i32) {
        self.progress = progress.clamp(0, 100);
    }

    /// 断点位点的缓存键
    pub fn breakpoint_key(&self) -> String {
        format!("breakpoint:{}", self.id)
    }

    /// 心跳的缓存键
    pub fn heartbeat_key(&self) -> String {
        format!("heartbeat:{}", self.id)
    }

    pub fn entity_description(&self) -> String {
        format!(
            "任务 '{}' (ID: {}, 集合: {})",
            self.name, self.id, self.collection
        )
    }
}
