use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cronserver_core::config::AppConfig;
use cronserver_core::models::NotifyChannel;
use cronserver_core::traits::{
    HostRepository, SettingRepository, TaskHostRepository, TaskLogRepository, TaskRepository,
};
use cronserver_dispatcher::{
    ExecutionDispatcher, LogRetentionSweeper, NotificationDispatcher, SchedulerCore,
    TaskAdminService, TaskHostIndex, TaskQueryService,
};
use cronserver_infrastructure::{
    connect, repair_settings, AgentTransport, HttpTaskTransport, MailSender, SlackSender,
    SqliteHostRepository, SqliteSettingRepository, SqliteTaskHostRepository,
    SqliteTaskLogRepository, SqliteTaskRepository, WebhookSender,
};

/// 应用实例，负责组件装配与生命周期
pub struct Application {
    scheduler: Arc<SchedulerCore>,
    admin: Arc<TaskAdminService>,
    query: Arc<TaskQueryService>,
    hosts: Arc<dyn HostRepository>,
    sweeper: Arc<LogRetentionSweeper>,
    cancel: CancellationToken,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用组件");

        let pool = connect(&config.database.url, config.database.max_connections)
            .await
            .context("数据库初始化失败")?;

        let task_repo: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let host_repo: Arc<dyn TaskHostRepository> =
            Arc::new(SqliteTaskHostRepository::new(pool.clone()));
        let log_repo: Arc<dyn TaskLogRepository> =
            Arc::new(SqliteTaskLogRepository::new(pool.clone()));
        let hosts: Arc<dyn HostRepository> = Arc::new(SqliteHostRepository::new(pool.clone()));
        let setting_repo: Arc<dyn SettingRepository> =
            Arc::new(SqliteSettingRepository::new(pool));

        // 每次启动补齐缺失的通知与系统配置
        repair_settings(setting_repo.as_ref())
            .await
            .context("配置修复失败")?;

        let command_transport =
            Arc::new(AgentTransport::new(&config.agent).context("构建代理传输失败")?);
        let http_transport = Arc::new(HttpTaskTransport::new().context("构建HTTP传输失败")?);

        let notifier = NotificationDispatcher::new(setting_repo.clone())
            .with_sender(NotifyChannel::Mail, Arc::new(MailSender::new(setting_repo.clone())))
            .with_sender(NotifyChannel::Slack, Arc::new(SlackSender::new(setting_repo.clone())))
            .with_sender(
                NotifyChannel::Webhook,
                Arc::new(WebhookSender::new(setting_repo.clone())),
            );

        let dispatcher = Arc::new(ExecutionDispatcher::new(
            task_repo.clone(),
            log_repo.clone(),
            TaskHostIndex::new(host_repo.clone()),
            command_transport,
            http_transport,
            notifier,
            config.dispatch.max_dependency_depth,
        ));

        let scheduler = Arc::new(SchedulerCore::new(task_repo.clone(), dispatcher.clone()));
        let admin = Arc::new(TaskAdminService::new(
            task_repo.clone(),
            TaskHostIndex::new(host_repo.clone()),
            scheduler.clone(),
            dispatcher,
        ));
        let query = Arc::new(TaskQueryService::new(
            task_repo,
            TaskHostIndex::new(host_repo),
        ));
        let sweeper = Arc::new(LogRetentionSweeper::new(setting_repo, log_repo));

        Ok(Self {
            scheduler,
            admin,
            query,
            hosts,
            sweeper,
            cancel: CancellationToken::new(),
        })
    }

    /// 任务管理入口，供内嵌场景使用
    pub fn _admin(&self) -> Arc<TaskAdminService> {
        self.admin.clone()
    }

    /// 任务列表查询入口，供内嵌场景使用
    pub fn _query(&self) -> Arc<TaskQueryService> {
        self.query.clone()
    }

    /// 主机管理入口，供内嵌场景使用
    pub fn _hosts(&self) -> Arc<dyn HostRepository> {
        self.hosts.clone()
    }

    /// 运行至收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let armed = self
            .scheduler
            .initialize()
            .await
            .context("定时器初始化失败")?;
        info!("调度器已就绪，{} 个任务在定时器中", armed);

        let sweeper_handle = self.sweeper.clone().spawn(self.cancel.clone());

        let _ = shutdown_rx.recv().await;

        info!("开始停止调度组件");
        self.cancel.cancel();
        self.scheduler.shutdown();
        sweeper_handle.abort();

        Ok(())
    }
}
