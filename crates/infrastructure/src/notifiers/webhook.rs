use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use cronserver_core::models::setting::{URL_KEY, WEBHOOK_CODE};
use cronserver_core::traits::{NotificationMessage, NotificationSender, SettingRepository};
use cronserver_core::{SchedulerError, SchedulerResult};

/// Webhook通知渠道。渲染后的内容本身是JSON，原样作为请求体POST出去。
pub struct WebhookSender {
    client: Client,
    setting_repo: Arc<dyn SettingRepository>,
}

impl WebhookSender {
    pub fn new(setting_repo: Arc<dyn SettingRepository>) -> Self {
        Self {
            client: Client::new(),
            setting_repo,
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(&self, message: &NotificationMessage) -> SchedulerResult<()> {
        let url = self
            .setting_repo
            .get(WEBHOOK_CODE, URL_KEY)
            .await?
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SchedulerError::Notification("Webhook URL未配置".to_string()))?;

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(message.content.clone())
            .send()
            .await
            .map_err(|e| SchedulerError::Notification(format!("Webhook请求失败: {e}")))?;

        if !response.status().is_success() {
            return Err(SchedulerError::Notification(format!(
                "Webhook返回异常状态: {}",
                response.status()
            )));
        }

        info!("任务 {} 的Webhook通知已发送", message.task_id);
        Ok(())
    }
}
