use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use cronserver_core::models::{
    DependencyStatus, Multiplicity, NotifyChannel, NotifyStatus, Task, TaskHttpMethod, TaskLevel,
    TaskProtocol, TaskStatus,
};
use cronserver_core::traits::TaskRepository;
use cronserver_core::{SchedulerError, SchedulerResult};

use crate::cron_utils::CronScheduler;
use crate::execution::ExecutionDispatcher;
use crate::host_index::TaskHostIndex;
use crate::scheduler::SchedulerCore;

/// 任务保存表单，ID为0表示新建
#[derive(Debug, Clone)]
pub struct TaskForm {
    pub id: i64,
    pub name: String,
    pub level: TaskLevel,
    pub spec: String,
    pub protocol: TaskProtocol,
    pub command: String,
    pub http_method: TaskHttpMethod,
    pub timeout: i64,
    pub multi: Multiplicity,
    pub retry_times: i64,
    pub retry_interval: i64,
    pub dependency_status: DependencyStatus,
    pub dependency_task_ids: Vec<i64>,
    pub notify_status: NotifyStatus,
    pub notify_type: NotifyChannel,
    pub notify_receiver_ids: Vec<String>,
    pub notify_keyword: String,
    pub host_ids: Vec<i64>,
    pub tag: String,
    pub remark: String,
}

/// 任务管理服务。校验并保存任务定义，维护主机关联，
/// 按任务状态同步定时器注册表。所有校验在任何持久化之前完成。
pub struct TaskAdminService {
    task_repo: Arc<dyn TaskRepository>,
    host_index: TaskHostIndex,
    scheduler: Arc<SchedulerCore>,
    dispatcher: Arc<ExecutionDispatcher>,
}

impl TaskAdminService {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        host_index: TaskHostIndex,
        scheduler: Arc<SchedulerCore>,
        dispatcher: Arc<ExecutionDispatcher>,
    ) -> Self {
        Self {
            task_repo,
            host_index,
            scheduler,
            dispatcher,
        }
    }

    /// 保存任务（新建或更新），返回任务ID
    pub async fn store(&self, mut form: TaskForm) -> SchedulerResult<i64> {
        form.command = form.command.trim().to_string();
        self.validate(&form).await?;

        // 子任务由依赖触发，不保留表达式，也不再挂自己的子任务
        if form.level == TaskLevel::Minor {
            form.spec.clear();
            form.dependency_task_ids.clear();
        }

        let id = if form.id == 0 {
            let task = self.build_task(&form, None);
            let id = self.task_repo.create(&task).await?;
            info!("任务 {} ({}) 已创建", id, task.name);
            id
        } else {
            let existing = self
                .task_repo
                .get_by_id(form.id)
                .await?
                .ok_or(SchedulerError::TaskNotFound { id: form.id })?;
            let task = self.build_task(&form, Some(&existing));
            self.task_repo.update(&task).await?;
            info!("任务 {} ({}) 已更新", task.id, task.name);
            form.id
        };

        // 主机集合整体替换; 非RPC协议的任务清空关联
        if form.protocol == TaskProtocol::Rpc {
            self.host_index.add(id, &form.host_ids).await?;
        } else {
            self.host_index.remove(id).await?;
        }

        // 按落库后的状态同步定时器
        let status = self.task_repo.get_status(id).await?;
        if status == Some(TaskStatus::Enabled) && form.level == TaskLevel::Major {
            if let Some(task) = self.task_repo.get_by_id(id).await? {
                self.scheduler.remove_and_add(&task)?;
            }
        } else {
            self.scheduler.remove(id);
        }

        Ok(id)
    }

    /// 激活任务，主任务同时装入定时器
    pub async fn enable(&self, id: i64) -> SchedulerResult<()> {
        let task = self
            .task_repo
            .get_by_id(id)
            .await?
            .ok_or(SchedulerError::TaskNotFound { id })?;
        self.task_repo.update_status(id, TaskStatus::Enabled).await?;

        if task.is_major() {
            let mut task = task;
            task.status = TaskStatus::Enabled;
            self.scheduler.remove_and_add(&task)?;
        }
        Ok(())
    }

    /// 暂停任务: 拆除定时器并停止在途重试，已派发的执行跑完为止
    pub async fn disable(&self, id: i64) -> SchedulerResult<()> {
        self.task_repo.update_status(id, TaskStatus::Disabled).await?;
        self.scheduler.remove(id);
        self.dispatcher.cancel_task(id);
        Ok(())
    }

    /// 删除任务及其主机关联
    pub async fn delete(&self, id: i64) -> SchedulerResult<()> {
        self.task_repo.delete(id).await?;
        self.host_index.remove(id).await?;
        self.scheduler.remove(id);
        self.dispatcher.cancel_task(id);
        Ok(())
    }

    /// 手动运行一次
    pub async fn run(&self, id: i64) -> SchedulerResult<()> {
        let task = self
            .task_repo
            .get_by_id(id)
            .await?
            .ok_or(SchedulerError::TaskNotFound { id })?;
        self.scheduler.run(task);
        Ok(())
    }

    /// 校验链，任一失败都在持久化之前同步返回
    async fn validate(&self, form: &TaskForm) -> SchedulerResult<()> {
        if form.name.is_empty() || form.name.chars().count() > 32 {
            return Err(SchedulerError::InvalidTaskParams(
                "任务名称不能为空且长度不超过32".to_string(),
            ));
        }
        if self.task_repo.name_exists(&form.name, form.id).await? {
            return Err(SchedulerError::TaskNameExists {
                name: form.name.clone(),
            });
        }
        if form.command.is_empty() {
            return Err(SchedulerError::InvalidTaskParams(
                "任务命令不能为空".to_string(),
            ));
        }

        if form.protocol == TaskProtocol::Rpc && form.host_ids.is_empty() {
            return Err(SchedulerError::InvalidTaskParams(
                "请选择主机名".to_string(),
            ));
        }

        if form.protocol == TaskProtocol::Http {
            let lower = form.command.to_lowercase();
            if !lower.starts_with("http://") && !lower.starts_with("https://") {
                return Err(SchedulerError::InvalidTaskParams(
                    "请输入正确的URL地址".to_string(),
                ));
            }
            if form.timeout > 300 {
                return Err(SchedulerError::InvalidTaskParams(
                    "HTTP任务超时时间不能超过300秒".to_string(),
                ));
            }
        }

        if !(0..=86400).contains(&form.timeout) {
            return Err(SchedulerError::InvalidTaskParams(
                "任务超时时间取值0-86400".to_string(),
            ));
        }
        if !(0..=10).contains(&form.retry_times) {
            return Err(SchedulerError::InvalidTaskParams(
                "任务重试次数取值0-10".to_string(),
            ));
        }
        if !(0..=3600).contains(&form.retry_interval) {
            return Err(SchedulerError::InvalidTaskParams(
                "任务重试间隔时间取值0-3600".to_string(),
            ));
        }

        if form.notify_status != NotifyStatus::None
            && form.notify_type.requires_receivers()
            && form.notify_receiver_ids.is_empty()
        {
            return Err(SchedulerError::InvalidTaskParams(
                "至少选择一个通知接收者".to_string(),
            ));
        }

        if form.level == TaskLevel::Major {
            if form.spec.is_empty() {
                return Err(SchedulerError::InvalidTaskParams(
                    "主任务必须填写CRON表达式".to_string(),
                ));
            }
            CronScheduler::validate_cron_expression(&form.spec)?;
        }

        // 长度为1的环: 任务不允许把自己列为子任务
        if form.id > 0 && form.dependency_task_ids.contains(&form.id) {
            return Err(SchedulerError::SelfDependency { id: form.id });
        }

        Ok(())
    }

    fn build_task(&self, form: &TaskForm, existing: Option<&Task>) -> Task {
        let now = Utc::now();
        Task {
            id: form.id,
            name: form.name.clone(),
            level: form.level,
            spec: form.spec.clone(),
            protocol: form.protocol,
            command: form.command.clone(),
            http_method: form.http_method,
            timeout: form.timeout,
            multi: form.multi,
            retry_times: form.retry_times,
            retry_interval: form.retry_interval,
            dependency_status: form.dependency_status,
            dependency_task_ids: form.dependency_task_ids.clone(),
            notify_status: form.notify_status,
            notify_type: form.notify_type,
            notify_receiver_ids: form.notify_receiver_ids.clone(),
            notify_keyword: form.notify_keyword.clone(),
            tag: form.tag.clone(),
            remark: form.remark.clone(),
            // 新建任务默认Created，不装入定时器; 更新保留原状态
            status: existing.map(|t| t.status).unwrap_or(TaskStatus::Created),
            created_at: existing.map(|t| t.created_at).unwrap_or(now),
            updated_at: now,
            next_run_time: None,
        }
    }
}

impl Default for TaskForm {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            level: TaskLevel::Major,
            spec: String::new(),
            protocol: TaskProtocol::Rpc,
            command: String::new(),
            http_method: TaskHttpMethod::Get,
            timeout: 0,
            multi: Multiplicity::Serial,
            retry_times: 0,
            retry_interval: 0,
            dependency_status: DependencyStatus::Strong,
            dependency_task_ids: Vec::new(),
            notify_status: NotifyStatus::None,
            notify_type: NotifyChannel::None,
            notify_receiver_ids: Vec::new(),
            notify_keyword: String::new(),
            host_ids: Vec::new(),
            tag: String::new(),
            remark: String::new(),
        }
    }
}
