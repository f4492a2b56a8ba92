//! 调度与执行层
//!
//! `TaskOrchestrator`持有任务状态机并触发执行；`SyncRunner`执行
//! 一次具体的同步运行（分片抽取、向量化、幂等写入）；`RetryQueue`
//! 负责投递失败后的指数退避重投与告警升级。

pub mod orchestrator;
pub mod retry;
pub mod runner;

pub use orchestrator::TaskOrchestrator;
pub use retry::{RetryPolicy, RetryQueue};
pub use runner::{RunSummary, SyncRunner};
