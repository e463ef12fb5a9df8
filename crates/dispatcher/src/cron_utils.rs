use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use cronserver_core::{SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
#[derive(Debug)]
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器，支持五段和六段表达式
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let normalized = normalize_cron_expression(cron_expr);
        let schedule =
            Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
                expr: cron_expr.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self { schedule })
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        let normalized = normalize_cron_expression(cron_expr);
        Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

/// 五段表达式省略了秒位，补0对齐到cron库要求的六段格式
fn normalize_cron_expression(expr: &str) -> String {
    let trimmed = expr.trim();
    let field_count = trimmed.split_whitespace().count();
    if field_count == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_field_expression_is_normalized() {
        let scheduler = CronScheduler::new("*/5 * * * *").unwrap();
        let next = scheduler.next_execution_time(Utc::now());
        assert!(next.is_some());
    }

    #[test]
    fn test_six_field_expression_parses_as_is() {
        assert!(CronScheduler::new("0 0 3 * * *").is_ok());
    }

    #[test]
    fn test_invalid_expression_is_rejected() {
        let err = CronScheduler::new("not a cron").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }
}
