use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use cronserver_core::models::setting::{SLACK_CODE, URL_KEY};
use cronserver_core::traits::{NotificationMessage, NotificationSender, SettingRepository};
use cronserver_core::{SchedulerError, SchedulerResult};

/// Slack通知渠道，向配置的Incoming Webhook地址推送消息
pub struct SlackSender {
    client: Client,
    setting_repo: Arc<dyn SettingRepository>,
}

impl SlackSender {
    pub fn new(setting_repo: Arc<dyn SettingRepository>) -> Self {
        Self {
            client: Client::new(),
            setting_repo,
        }
    }
}

#[async_trait]
impl NotificationSender for SlackSender {
    async fn send(&self, message: &NotificationMessage) -> SchedulerResult<()> {
        let url = self
            .setting_repo
            .get(SLACK_CODE, URL_KEY)
            .await?
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SchedulerError::Notification("Slack URL未配置".to_string()))?;

        // 接收人以@提及形式附在正文后
        let mentions = message
            .receivers
            .iter()
            .map(|r| format!("<@{r}>"))
            .collect::<Vec<_>>()
            .join(" ");
        let text = if mentions.is_empty() {
            format!("{}\n{}", message.subject, message.content)
        } else {
            format!("{}\n{}\n{}", message.subject, message.content, mentions)
        };

        let response = self
            .client
            .post(&url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| SchedulerError::Notification(format!("Slack请求失败: {e}")))?;

        if !response.status().is_success() {
            return Err(SchedulerError::Notification(format!(
                "Slack返回异常状态: {}",
                response.status()
            )));
        }

        info!("任务 {} 的Slack通知已发送", message.task_id);
        Ok(())
    }
}
