use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use cronserver_core::models::{setting, NotifyChannel, Task};
use cronserver_core::traits::{NotificationMessage, NotificationSender, SettingRepository};

use crate::execution::OccurrenceOutcome;

/// 通知分发器。根据任务的通知设置决定是否发送、发往哪个渠道。
/// 通知失败只记录日志，不影响任务本身的执行结果。
pub struct NotificationDispatcher {
    setting_repo: Arc<dyn SettingRepository>,
    senders: HashMap<NotifyChannel, Arc<dyn NotificationSender>>,
}

impl NotificationDispatcher {
    pub fn new(setting_repo: Arc<dyn SettingRepository>) -> Self {
        Self {
            setting_repo,
            senders: HashMap::new(),
        }
    }

    pub fn with_sender(
        mut self,
        channel: NotifyChannel,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    pub async fn notify(&self, task: &Task, outcome: &OccurrenceOutcome) {
        if !task.notify_status.should_notify(outcome.success) {
            return;
        }
        if task.notify_type == NotifyChannel::None {
            return;
        }

        let Some(sender) = self.senders.get(&task.notify_type) else {
            warn!(
                "任务 {} 配置的通知渠道 {:?} 没有注册发送器",
                task.id, task.notify_type
            );
            return;
        };

        let content = self.render_content(task, outcome).await;
        let status_text = if outcome.success { "成功" } else { "失败" };
        let message = NotificationMessage {
            task_id: task.id,
            task_name: task.name.clone(),
            receivers: task.notify_receiver_ids.clone(),
            subject: format!("任务[{}]执行{}", task.name, status_text),
            content,
        };

        // 通知渠道故障不改变本次执行的成败结论
        if let Err(e) = sender.send(&message).await {
            error!("任务 {} 通知发送失败: {}", task.id, e);
        } else {
            debug!("任务 {} 已通过 {:?} 渠道发送通知", task.id, task.notify_type);
        }
    }

    /// 取渠道模板并替换占位符，模板缺失时退回内置模板
    async fn render_content(&self, task: &Task, outcome: &OccurrenceOutcome) -> String {
        let template = match task.notify_type.setting_code() {
            Some(code) => match self.setting_repo.get(code, setting::TEMPLATE_KEY).await {
                Ok(Some(tpl)) if !tpl.is_empty() => tpl,
                Ok(_) => default_template(task.notify_type).to_string(),
                Err(e) => {
                    error!("读取通知模板失败: {}，使用内置模板", e);
                    default_template(task.notify_type).to_string()
                }
            },
            None => return String::new(),
        };

        render_template(&template, task, outcome)
    }
}

fn default_template(channel: NotifyChannel) -> &'static str {
    match channel {
        NotifyChannel::Slack => setting::SLACK_TEMPLATE,
        NotifyChannel::Mail => setting::MAIL_TEMPLATE,
        NotifyChannel::Webhook => setting::WEBHOOK_TEMPLATE,
        NotifyChannel::None => "",
    }
}

/// 占位符替换: {{task_id}} {{task_name}} {{status}} {{result}} {{keyword}}
pub fn render_template(template: &str, task: &Task, outcome: &OccurrenceOutcome) -> String {
    let status_text = if outcome.success { "成功" } else { "失败" };
    template
        .replace("{{task_id}}", &task.id.to_string())
        .replace("{{task_name}}", &task.name)
        .replace("{{status}}", status_text)
        .replace("{{result}}", &outcome.summary())
        .replace("{{keyword}}", &task.notify_keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{HostResult, OccurrenceOutcome};
    use cronserver_core::models::{TaskLevel, TaskProtocol};
    use cronserver_core::traits::ExecutionOutput;

    #[test]
    fn test_render_template_substitutes_placeholders() {
        let mut task = Task::new(
            "backup".to_string(),
            TaskLevel::Major,
            TaskProtocol::Rpc,
            "/usr/bin/backup.sh".to_string(),
        );
        task.id = 7;
        task.notify_keyword = "夜间备份".to_string();

        let outcome = OccurrenceOutcome {
            success: false,
            results: vec![HostResult {
                hostname: "db01".to_string(),
                output: ExecutionOutput::failure("exit 1"),
                attempts: 2,
            }],
        };

        let rendered = render_template(
            "{{task_id}}/{{task_name}}/{{status}}/{{keyword}}",
            &task,
            &outcome,
        );
        assert_eq!(rendered, "7/backup/失败/夜间备份");
    }
}
