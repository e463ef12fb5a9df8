use serde::{Deserialize, Serialize};

/// 通知与系统配置，按(code, key)二元组存储
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub id: i64,
    pub code: String,
    pub key: String,
    pub value: String,
}

pub const SLACK_CODE: &str = "slack";
pub const MAIL_CODE: &str = "mail";
pub const WEBHOOK_CODE: &str = "webhook";
pub const SYSTEM_CODE: &str = "system";

pub const URL_KEY: &str = "url";
pub const TEMPLATE_KEY: &str = "template";
pub const MAIL_SERVER_KEY: &str = "server";
pub const LOG_RETENTION_DAYS_KEY: &str = "log_retention_days";
pub const LOG_CLEANUP_TIME_KEY: &str = "log_cleanup_time";
pub const LOG_FILE_SIZE_LIMIT_KEY: &str = "log_file_size_limit";

/// 内置通知模板，占位符在发送前被替换
pub const SLACK_TEMPLATE: &str = "任务ID: {{task_id}}\n任务名称: {{task_name}}\n状态: {{status}}\n执行结果: {{result}}\n备注: {{keyword}}";
pub const MAIL_TEMPLATE: &str = "任务ID: {{task_id}}\n任务名称: {{task_name}}\n状态: {{status}}\n执行结果: {{result}}\n备注: {{keyword}}";
pub const WEBHOOK_TEMPLATE: &str = r#"{"task_id": "{{task_id}}", "task_name": "{{task_name}}", "status": "{{status}}", "result": "{{result}}", "keyword": "{{keyword}}"}"#;

/// 所有必需的配置项及其安全默认值。
/// 修复例程确保每一项都存在，通知路径不会读到缺失配置
pub fn required_settings() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        // Slack 配置
        (SLACK_CODE, URL_KEY, ""),
        (SLACK_CODE, TEMPLATE_KEY, SLACK_TEMPLATE),
        // 邮件配置
        (MAIL_CODE, MAIL_SERVER_KEY, ""),
        (MAIL_CODE, TEMPLATE_KEY, MAIL_TEMPLATE),
        // Webhook 配置
        (WEBHOOK_CODE, URL_KEY, ""),
        (WEBHOOK_CODE, TEMPLATE_KEY, WEBHOOK_TEMPLATE),
        // 系统配置
        (SYSTEM_CODE, LOG_RETENTION_DAYS_KEY, "0"),
        (SYSTEM_CODE, LOG_CLEANUP_TIME_KEY, "03:00"),
        (SYSTEM_CODE, LOG_FILE_SIZE_LIMIT_KEY, "0"),
    ]
}
