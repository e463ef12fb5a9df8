use std::sync::Arc;

use chrono::{Duration, Utc};

use cronserver_core::models::setting::{LOG_RETENTION_DAYS_KEY, SYSTEM_CODE};
use cronserver_core::models::{TaskLog, TaskProtocol};
use cronserver_core::traits::TaskLogRepository;
use cronserver_dispatcher::retention::LogRetentionSweeper;
use cronserver_dispatcher::testing::{MemorySettingRepository, MemoryTaskLogRepository};

async fn seed_log(repo: &MemoryTaskLogRepository, name: &str, age_days: i64) {
    let mut log = TaskLog::start(1, name, "0 * * * * *", TaskProtocol::Rpc, "echo", 0, "web01", 0);
    log.start_time = Utc::now() - Duration::days(age_days);
    repo.create(&log).await.unwrap();
}

#[tokio::test]
async fn test_zero_retention_disables_sweep() {
    let setting_repo = Arc::new(MemorySettingRepository::new());
    setting_repo.insert(SYSTEM_CODE, LOG_RETENTION_DAYS_KEY, "0");
    let log_repo = Arc::new(MemoryTaskLogRepository::new());
    seed_log(&log_repo, "ancient", 365).await;

    let sweeper = LogRetentionSweeper::new(setting_repo, log_repo.clone());
    let purged = sweeper.sweep_once().await.unwrap();

    assert_eq!(purged, 0);
    assert_eq!(log_repo.all().len(), 1);
}

#[tokio::test]
async fn test_sweep_purges_only_expired_logs() {
    let setting_repo = Arc::new(MemorySettingRepository::new());
    setting_repo.insert(SYSTEM_CODE, LOG_RETENTION_DAYS_KEY, "7");
    let log_repo = Arc::new(MemoryTaskLogRepository::new());
    seed_log(&log_repo, "expired", 30).await;
    seed_log(&log_repo, "recent", 1).await;

    let sweeper = LogRetentionSweeper::new(setting_repo, log_repo.clone());
    let purged = sweeper.sweep_once().await.unwrap();

    assert_eq!(purged, 1);
    let remaining = log_repo.all();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "recent");
}

#[tokio::test]
async fn test_missing_retention_setting_is_treated_as_disabled() {
    let setting_repo = Arc::new(MemorySettingRepository::new());
    let log_repo = Arc::new(MemoryTaskLogRepository::new());
    seed_log(&log_repo, "ancient", 365).await;

    let sweeper = LogRetentionSweeper::new(setting_repo, log_repo.clone());
    let purged = sweeper.sweep_once().await.unwrap();

    assert_eq!(purged, 0);
    assert_eq!(log_repo.all().len(), 1);
}
