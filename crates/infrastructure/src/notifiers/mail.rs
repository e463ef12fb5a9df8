use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use tracing::{info, warn};

use cronserver_core::models::setting::{MAIL_CODE, MAIL_SERVER_KEY};
use cronserver_core::traits::{NotificationMessage, NotificationSender, SettingRepository};
use cronserver_core::{SchedulerError, SchedulerResult};

/// mail.server配置项的JSON结构
#[derive(Debug, Deserialize)]
struct MailServerConfig {
    host: String,
    #[serde(default = "default_smtp_port")]
    port: u16,
    user: String,
    password: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// 邮件通知渠道，SMTP服务器参数从配置存储读取
pub struct MailSender {
    setting_repo: Arc<dyn SettingRepository>,
}

impl MailSender {
    pub fn new(setting_repo: Arc<dyn SettingRepository>) -> Self {
        Self { setting_repo }
    }

    async fn server_config(&self) -> SchedulerResult<MailServerConfig> {
        let raw = self
            .setting_repo
            .get(MAIL_CODE, MAIL_SERVER_KEY)
            .await?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SchedulerError::Notification("邮件服务器未配置".to_string()))?;

        serde_json::from_str(&raw)
            .map_err(|e| SchedulerError::Notification(format!("邮件服务器配置解析失败: {e}")))
    }
}

#[async_trait]
impl NotificationSender for MailSender {
    async fn send(&self, message: &NotificationMessage) -> SchedulerResult<()> {
        let server = self.server_config().await?;

        let from: Mailbox = server
            .user
            .parse()
            .map_err(|e| SchedulerError::Notification(format!("发件人地址无效: {e}")))?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server.host)
            .map_err(|e| SchedulerError::Notification(format!("SMTP连接配置失败: {e}")))?
            .port(server.port)
            .credentials(Credentials::new(server.user.clone(), server.password.clone()))
            .build();

        let mut sent = 0;
        for receiver in &message.receivers {
            let to: Mailbox = match receiver.parse() {
                Ok(to) => to,
                Err(e) => {
                    warn!("收件人地址 {} 无效，跳过: {}", receiver, e);
                    continue;
                }
            };

            let email = Message::builder()
                .from(from.clone())
                .to(to)
                .subject(&message.subject)
                .header(ContentType::TEXT_PLAIN)
                .body(message.content.clone())
                .map_err(|e| SchedulerError::Notification(format!("构建邮件失败: {e}")))?;

            mailer
                .send(email)
                .await
                .map_err(|e| SchedulerError::Notification(format!("邮件发送失败: {e}")))?;
            sent += 1;
        }

        if sent == 0 {
            return Err(SchedulerError::Notification(
                "没有有效的收件人地址".to_string(),
            ));
        }

        info!("任务 {} 的邮件通知已发送给 {} 个收件人", message.task_id, sent);
        Ok(())
    }
}
