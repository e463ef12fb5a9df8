use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use cronserver_core::models::setting::{
    LOG_CLEANUP_TIME_KEY, LOG_RETENTION_DAYS_KEY, SYSTEM_CODE,
};
use cronserver_core::traits::{SettingRepository, TaskLogRepository};
use cronserver_core::SchedulerResult;

/// 清理时刻配置非法时的兜底值
const DEFAULT_CLEANUP_TIME: &str = "03:00";

/// 执行日志保留清理。每天在系统配置的清理时刻删除过期日志，
/// 保留天数为0时只跳过本轮，配置改动在下一轮生效。
pub struct LogRetentionSweeper {
    setting_repo: Arc<dyn SettingRepository>,
    log_repo: Arc<dyn TaskLogRepository>,
}

impl LogRetentionSweeper {
    pub fn new(
        setting_repo: Arc<dyn SettingRepository>,
        log_repo: Arc<dyn TaskLogRepository>,
    ) -> Self {
        Self {
            setting_repo,
            log_repo,
        }
    }

    /// 启动每日清理循环，收到取消信号后退出
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let cleanup_time = match self
                    .setting_repo
                    .get(SYSTEM_CODE, LOG_CLEANUP_TIME_KEY)
                    .await
                {
                    Ok(Some(value)) => value,
                    Ok(None) => DEFAULT_CLEANUP_TIME.to_string(),
                    Err(e) => {
                        error!("读取日志清理时刻配置失败: {}", e);
                        DEFAULT_CLEANUP_TIME.to_string()
                    }
                };

                let now = Utc::now();
                let next = Self::next_cleanup_instant(now, &cleanup_time);
                let wait = (next - now).to_std().unwrap_or_default();
                debug!("下一轮日志清理时间: {}", next.format("%Y-%m-%d %H:%M UTC"));

                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("日志清理循环收到取消信号");
                        return;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }

                match self.sweep_once().await {
                    Ok(0) => {}
                    Ok(purged) => info!("日志清理完成，删除 {} 条过期记录", purged),
                    Err(e) => error!("日志清理失败: {}", e),
                }
            }
        })
    }

    /// 执行一轮清理，返回删除的行数。保留天数缺失、非法或为0时不清理。
    pub async fn sweep_once(&self) -> SchedulerResult<u64> {
        let retention_days = self
            .setting_repo
            .get(SYSTEM_CODE, LOG_RETENTION_DAYS_KEY)
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);

        if retention_days <= 0 {
            debug!("日志保留天数为0，跳过清理");
            return Ok(0);
        }

        self.log_repo.purge_older_than(retention_days).await
    }

    /// 当天清理时刻未过取当天，否则取次日。时刻格式HH:MM，非法时取03:00。
    pub fn next_cleanup_instant(now: DateTime<Utc>, cleanup_time: &str) -> DateTime<Utc> {
        let time = NaiveTime::parse_from_str(cleanup_time, "%H:%M").unwrap_or_else(|_| {
            NaiveTime::parse_from_str(DEFAULT_CLEANUP_TIME, "%H:%M")
                .unwrap_or_else(|_| NaiveTime::MIN)
        });

        let today = now.date_naive().and_time(time).and_utc();
        if today > now {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_cleanup_later_today() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap();
        let next = LogRetentionSweeper::next_cleanup_instant(now, "03:00");
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_next_cleanup_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 4, 0, 0).unwrap();
        let next = LogRetentionSweeper::next_cleanup_instant(now, "03:00");
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_cleanup_time_falls_back_to_default() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap();
        let next = LogRetentionSweeper::next_cleanup_instant(now, "二十五点");
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap());
    }
}
