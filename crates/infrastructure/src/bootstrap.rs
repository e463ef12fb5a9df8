use tracing::info;

use cronserver_core::models::setting::required_settings;
use cronserver_core::traits::SettingRepository;
use cronserver_core::SchedulerResult;

/// 配置修复例程。逐项补齐缺失的通知与系统配置，
/// 已存在的配置保持原值。幂等，每次进程启动时执行。
/// 返回本轮新建的配置条数。
pub async fn repair_settings(repo: &dyn SettingRepository) -> SchedulerResult<usize> {
    let mut created = 0;
    for (code, key, default_value) in required_settings() {
        if repo.create_if_missing(code, key, default_value).await? {
            info!("补齐缺失配置: {}.{}", code, key);
            created += 1;
        }
    }
    if created > 0 {
        info!("配置修复完成，共补齐 {} 项", created);
    }
    Ok(created)
}
