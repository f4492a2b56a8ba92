use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use crate::{SyncError, SyncResult};

/// 任务调度表达式
///
/// CRON使用cron crate的秒级六/七段语法（Quartz风格子集）；INTERVAL的
/// 表达式是正整数秒。未知的调度类型在解析时即报配置错误，调度方
/// 据此fail closed，而不是退回某个默认间隔。
#[derive(Debug, Clone)]
pub enum TaskSchedule {
    Cron(Box<Schedule>),
    Interval(Duration),
}

impl TaskSchedule {
    /// 解析调度类型与表达式
    pub fn parse(schedule_type: &str, expression: &str) -> SyncResult<Self> {
        match schedule_type {
            "CRON" => {
                let schedule = Schedule::from_str(expression).map_err(|e| {
                    SyncError::Configuration(format!("CRON表达式 '{expression}' 无效: {e}"))
                })?;
                Ok(TaskSchedule::Cron(Box::new(schedule)))
            }
            "INTERVAL" => {
                let secs: i64 = expression.trim().parse().map_err(|_| {
                    SyncError::Configuration(format!("INTERVAL表达式 '{expression}' 不是秒数"))
                })?;
                if secs <= 0 {
                    return Err(SyncError::Configuration(format!(
                        "INTERVAL间隔必须为正数: {secs}"
                    )));
                }
                Ok(TaskSchedule::Interval(Duration::seconds(secs)))
            }
            other => Err(SyncError::Configuration(format!(
                "未知的调度类型: {other}"
            ))),
        }
    }

    /// 计算from之后的下一次执行时间
    ///
    /// CRON表达式可能不再有未来的触发点（如指定了具体年份），此时返回None。
    pub fn next_run_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TaskSchedule::Cron(schedule) => schedule.after(&from).next(),
            TaskSchedule::Interval(interval) => Some(from + *interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_parse_cron() {
        assert!(TaskSchedule::parse("CRON", "0 0 0 * * *").is_ok());
        assert!(TaskSchedule::parse("CRON", "0 */5 * * * *").is_ok());
        assert!(TaskSchedule::parse("CRON", "not a cron").is_err());
        assert!(TaskSchedule::parse("CRON", "").is_err());
    }

    #[test]
    fn test_parse_interval() {
        assert!(TaskSchedule::parse("INTERVAL", "300").is_ok());
        assert!(TaskSchedule::parse("INTERVAL", "0").is_err());
        assert!(TaskSchedule::parse("INTERVAL", "-5").is_err());
        assert!(TaskSchedule::parse("INTERVAL", "five").is_err());
    }

    #[test]
    fn test_unknown_schedule_type_fails_closed() {
        let err = TaskSchedule::parse("FIXED_RATE", "10").unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn test_next_run_interval() {
        let schedule = TaskSchedule::parse("INTERVAL", "60").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let next = schedule.next_run_after(from).unwrap();
        assert_eq!(next, from + Duration::seconds(60));
    }

    #[test]
    fn test_next_run_cron() {
        let schedule = TaskSchedule::parse("CRON", "0 0 0 * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        let next = schedule.next_run_after(from).unwrap();
        assert_eq!(next.hour(), 0);
        assert_eq!(next.minute(), 0);
        assert!(next > from);
    }
}
