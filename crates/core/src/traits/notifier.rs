use async_trait::async_trait;

use crate::errors::SchedulerResult;

/// 渲染完成的通知消息
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub task_id: i64,
    pub task_name: String,
    /// 接收人ID或地址，Webhook渠道忽略
    pub receivers: Vec<String>,
    pub subject: String,
    pub content: String,
}

/// 通知渠道发送器，每个渠道一个实现
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> SchedulerResult<()>;
}
