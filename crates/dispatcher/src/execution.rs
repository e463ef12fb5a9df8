use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cronserver_core::models::{Multiplicity, Task, TaskHost, TaskLog, TaskLogStatus, TaskProtocol};
use cronserver_core::traits::{
    CommandTransport, ExecutionOutput, HttpTransport, TaskLogRepository, TaskRepository,
};
use cronserver_core::SchedulerResult;

use crate::dependency::DependencyResolver;
use crate::host_index::TaskHostIndex;
use crate::notify::NotificationDispatcher;
use crate::retry::{RetryController, RetryPolicy};

/// 手动运行的调度标签，写入执行日志用于审计
pub const MANUAL_RUN_LABEL: &str = "手动运行";
/// 依赖触发的调度标签
pub const DEPENDENCY_RUN_LABEL: &str = "依赖触发";

/// 一次任务执行的触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// 定时器到点触发
    Schedule,
    /// 管理操作手动触发
    Manual,
    /// 父任务依赖链触发，depth为当前链深度
    Dependency { depth: u32 },
}

impl Trigger {
    pub fn depth(self) -> u32 {
        match self {
            Trigger::Dependency { depth } => depth,
            _ => 0,
        }
    }
}

/// 单个执行目标（一台主机或一次HTTP调用）的结果
#[derive(Debug, Clone)]
pub struct HostResult {
    /// 主机名，HTTP任务为空串
    pub hostname: String,
    pub output: ExecutionOutput,
    /// 含重试在内实际发起的尝试次数
    pub attempts: u32,
}

/// 一次任务执行（occurrence）的聚合结果
#[derive(Debug, Clone)]
pub struct OccurrenceOutcome {
    /// 所有目标全部成功才算成功
    pub success: bool,
    pub results: Vec<HostResult>,
}

impl OccurrenceOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            results: vec![HostResult {
                hostname: String::new(),
                output: ExecutionOutput::failure(message),
                attempts: 0,
            }],
        }
    }

    pub fn summary(&self) -> String {
        if self.results.len() == 1 {
            return self.results[0].output.output.clone();
        }
        self.results
            .iter()
            .map(|r| format!("[{}] {}", r.hostname, r.output.output))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 执行分发器。解析协议与目标主机，按任务的多主机策略扇出，
/// 每个目标套用重试控制器，聚合结果后触发通知与依赖链。
pub struct ExecutionDispatcher {
    task_log_repo: Arc<dyn TaskLogRepository>,
    host_index: TaskHostIndex,
    command_transport: Arc<dyn CommandTransport>,
    http_transport: Arc<dyn HttpTransport>,
    notifier: NotificationDispatcher,
    dependency_resolver: DependencyResolver,
    /// 任务级取消信号，禁用/删除任务时停止其在途重试
    cancel_tokens: Mutex<HashMap<i64, CancellationToken>>,
    max_dependency_depth: u32,
}

impl ExecutionDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        task_log_repo: Arc<dyn TaskLogRepository>,
        host_index: TaskHostIndex,
        command_transport: Arc<dyn CommandTransport>,
        http_transport: Arc<dyn HttpTransport>,
        notifier: NotificationDispatcher,
        max_dependency_depth: u32,
    ) -> Self {
        let dependency_resolver = DependencyResolver::new(task_repo);

        Self {
            task_log_repo,
            host_index,
            command_transport,
            http_transport,
            notifier,
            dependency_resolver,
            cancel_tokens: Mutex::new(HashMap::new()),
            max_dependency_depth,
        }
    }

    /// 执行一次任务。依赖链触发的子任务会递归重入本方法，
    /// 不经过调度器，子任务从不独立占用定时器槽位。
    pub fn dispatch(self: Arc<Self>, task: Task, trigger: Trigger) -> BoxFuture<'static, ()> {
        async move { self.dispatch_inner(task, trigger).await }.boxed()
    }

    async fn dispatch_inner(self: Arc<Self>, task: Task, trigger: Trigger) {
        let label = match trigger {
            Trigger::Schedule => task.spec.clone(),
            Trigger::Manual => MANUAL_RUN_LABEL.to_string(),
            Trigger::Dependency { .. } => DEPENDENCY_RUN_LABEL.to_string(),
        };
        info!("开始执行任务 {} ({}), 触发来源: {}", task.id, task.name, label);

        let cancel = self.cancel_token_for(task.id);
        let outcome = match task.protocol {
            TaskProtocol::Http => self.execute_http(&task, &label, &cancel).await,
            TaskProtocol::Rpc => self.execute_rpc(&task, &label, &cancel).await,
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("任务 {} 执行出错: {}", task.id, e);
                OccurrenceOutcome::failure(e.to_string())
            }
        };

        info!(
            "任务 {} ({}) 执行完成, 结果: {}",
            task.id,
            task.name,
            if outcome.success { "成功" } else { "失败" }
        );

        self.notifier.notify(&task, &outcome).await;
        self.clone()
            .chain_dependencies(&task, &outcome, trigger.depth())
            .await;
    }

    /// 触发依赖的子任务，按列出顺序依次执行
    async fn chain_dependencies(
        self: Arc<Self>,
        parent: &Task,
        outcome: &OccurrenceOutcome,
        depth: u32,
    ) {
        if parent.dependency_task_ids.is_empty() {
            return;
        }
        if depth >= self.max_dependency_depth {
            warn!(
                "任务 {} 的依赖链深度已达上限 {}，停止继续触发",
                parent.id, self.max_dependency_depth
            );
            return;
        }

        let children = match self.dependency_resolver.resolve(parent, outcome.success).await {
            Ok(children) => children,
            Err(e) => {
                error!("解析任务 {} 的依赖失败: {}", parent.id, e);
                return;
            }
        };

        for child in children {
            info!("任务 {} 触发子任务 {} ({})", parent.id, child.id, child.name);
            self.clone()
                .dispatch(child, Trigger::Dependency { depth: depth + 1 })
                .await;
        }
    }

    /// HTTP协议: 单次调用配置的URL，无主机扇出
    async fn execute_http(
        &self,
        task: &Task,
        label: &str,
        cancel: &CancellationToken,
    ) -> SchedulerResult<OccurrenceOutcome> {
        let policy = RetryPolicy::from_task(task);
        let log_repo = self.task_log_repo.clone();
        let transport = self.http_transport.clone();
        let task_c = task.clone();
        let label_c = label.to_string();

        let result = RetryController::execute(&policy, cancel, move |attempt_index| {
            let log_repo = log_repo.clone();
            let transport = transport.clone();
            let task = task_c.clone();
            let label = label_c.clone();
            async move {
                let log_id = start_attempt_log(&log_repo, &task, &label, "", attempt_index).await;
                let output = match transport
                    .request(task.http_method, &task.command, task.timeout)
                    .await
                {
                    Ok(output) => output,
                    Err(e) => ExecutionOutput::failure(e.to_string()),
                };
                finish_attempt_log(&log_repo, log_id, &output).await;
                output
            }
        })
        .await;

        Ok(OccurrenceOutcome {
            success: result.output.success,
            results: vec![HostResult {
                hostname: String::new(),
                output: result.output,
                attempts: result.attempts,
            }],
        })
    }

    /// RPC协议: 批量解析主机后按多主机策略扇出
    async fn execute_rpc(
        &self,
        task: &Task,
        label: &str,
        cancel: &CancellationToken,
    ) -> SchedulerResult<OccurrenceOutcome> {
        let mut host_map = self.host_index.hosts_for_tasks(&[task.id]).await?;
        let hosts = host_map.remove(&task.id).unwrap_or_default();

        if hosts.is_empty() {
            // 缺失主机分配无法靠重试修复，直接以失败终结本次执行
            warn!("任务 {} 没有可执行的主机", task.id);
            let log_repo = self.task_log_repo.clone();
            let log_id = start_attempt_log(&log_repo, task, label, "", 0).await;
            let output = ExecutionOutput::failure("没有可执行的主机");
            finish_attempt_log(&log_repo, log_id, &output).await;
            return Ok(OccurrenceOutcome {
                success: false,
                results: vec![HostResult {
                    hostname: String::new(),
                    output,
                    attempts: 1,
                }],
            });
        }

        let results = match task.multi {
            // 串行: 按分配顺序逐台执行，单台失败不跳过后续主机
            Multiplicity::Serial => {
                let mut results = Vec::with_capacity(hosts.len());
                for host in hosts {
                    results.push(self.run_on_host(task, label, host, cancel).await);
                }
                results
            }
            // 并发: 全部主机同时执行，各主机的重试互不阻塞
            Multiplicity::Concurrent => {
                let futures = hosts
                    .into_iter()
                    .map(|host| self.run_on_host(task, label, host, cancel));
                join_all(futures).await
            }
        };

        let success = results.iter().all(|r| r.output.success);
        Ok(OccurrenceOutcome { success, results })
    }

    /// 在单台主机上执行，套用任务的重试策略，每次尝试一条执行日志
    async fn run_on_host(
        &self,
        task: &Task,
        label: &str,
        host: TaskHost,
        cancel: &CancellationToken,
    ) -> HostResult {
        let policy = RetryPolicy::from_task(task);
        let log_repo = self.task_log_repo.clone();
        let transport = self.command_transport.clone();
        let task_c = task.clone();
        let label_c = label.to_string();
        let host_c = host.clone();

        let result = RetryController::execute(&policy, cancel, move |attempt_index| {
            let log_repo = log_repo.clone();
            let transport = transport.clone();
            let task = task_c.clone();
            let label = label_c.clone();
            let host = host_c.clone();
            async move {
                let log_id =
                    start_attempt_log(&log_repo, &task, &label, &host.name, attempt_index).await;
                let output = match transport.run(&host, &task.command, task.timeout).await {
                    Ok(output) => output,
                    Err(e) => ExecutionOutput::failure(e.to_string()),
                };
                finish_attempt_log(&log_repo, log_id, &output).await;
                output
            }
        })
        .await;

        HostResult {
            hostname: host.name,
            output: result.output,
            attempts: result.attempts,
        }
    }

    fn cancel_token_for(&self, task_id: i64) -> CancellationToken {
        let mut tokens = self.cancel_tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.entry(task_id).or_default().clone()
    }

    /// 停止任务的后续重试排期，在途尝试的终态结果仍会被记录
    pub fn cancel_task(&self, task_id: i64) {
        let mut tokens = self.cancel_tokens.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = tokens.remove(&task_id) {
            token.cancel();
        }
    }
}

async fn start_attempt_log(
    log_repo: &Arc<dyn TaskLogRepository>,
    task: &Task,
    label: &str,
    hostname: &str,
    attempt_index: u32,
) -> i64 {
    let log = TaskLog::start(
        task.id,
        &task.name,
        label,
        task.protocol,
        &task.command,
        task.timeout,
        hostname,
        attempt_index as i64,
    );
    match log_repo.create(&log).await {
        Ok(id) => id,
        Err(e) => {
            error!("写入执行日志失败: {}", e);
            0
        }
    }
}

async fn finish_attempt_log(
    log_repo: &Arc<dyn TaskLogRepository>,
    log_id: i64,
    output: &ExecutionOutput,
) {
    if log_id <= 0 {
        return;
    }
    let status = if output.success {
        TaskLogStatus::Finish
    } else {
        TaskLogStatus::Failure
    };
    if let Err(e) = log_repo.finish(log_id, status, &output.output).await {
        error!("回写执行日志 {} 失败: {}", log_id, e);
    }
}
