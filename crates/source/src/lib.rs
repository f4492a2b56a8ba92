//! 数据源方言层
//!
//! 每种关系型数据源以一个`DataSourceStrategy`实现接入：负责建连、
//! 渲染注入安全的分片/边界/计数查询，并把行解码为与方言无关的
//! `SourceRow`。实现按方言名注册到`StrategyRegistry`，调度侧只
//! 认方言字符串。

pub mod ident;
pub mod mysql;
pub mod postgres;
pub mod registry;

pub use mysql::MySqlStrategy;
pub use postgres::PostgresStrategy;
pub use registry::StrategyRegistry;
