//! 测试用内存实现，供本crate单元测试与集成测试共享

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use cronserver_core::models::{
    DependencyStatus, Multiplicity, NotifyChannel, NotifyStatus, Task, TaskFilter, TaskHost,
    TaskHttpMethod, TaskLevel, TaskLog, TaskLogFilter, TaskLogStatus, TaskProtocol, TaskStatus,
};
use cronserver_core::traits::{
    CommandTransport, ExecutionOutput, HttpTransport, NotificationMessage, NotificationSender,
    SettingRepository, TaskHostRepository, TaskLogRepository, TaskRepository,
};
use cronserver_core::{SchedulerError, SchedulerResult};

use crate::execution::ExecutionDispatcher;
use crate::host_index::TaskHostIndex;
use crate::notify::NotificationDispatcher;

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// 内存任务存储
#[derive(Default)]
pub struct MemoryTaskRepository {
    tasks: Mutex<HashMap<i64, Task>>,
    next_id: AtomicI64,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn task_count(&self) -> usize {
        lock(&self.tasks).len()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn create(&self, task: &Task) -> SchedulerResult<i64> {
        let mut tasks = lock(&self.tasks);
        let id = if task.id > 0 {
            self.next_id.fetch_max(task.id + 1, Ordering::SeqCst);
            task.id
        } else {
            self.next_id.fetch_add(1, Ordering::SeqCst)
        };
        let mut stored = task.clone();
        stored.id = id;
        tasks.insert(id, stored);
        Ok(id)
    }

    async fn update(&self, task: &Task) -> SchedulerResult<()> {
        let mut tasks = lock(&self.tasks);
        if !tasks.contains_key(&task.id) {
            return Err(SchedulerError::TaskNotFound { id: task.id });
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<()> {
        lock(&self.tasks).remove(&id);
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        Ok(lock(&self.tasks).get(&id).cloned())
    }

    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let tasks = lock(&self.tasks);
        let mut matched: Vec<Task> = tasks
            .values()
            .filter(|t| filter.id.map_or(true, |id| t.id == id))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.protocol.map_or(true, |p| t.protocol == p))
            .filter(|t| {
                filter
                    .name
                    .as_deref()
                    .map_or(true, |name| t.name.contains(name))
            })
            .filter(|t| filter.tag.as_deref().map_or(true, |tag| t.tag == tag))
            .cloned()
            .collect();
        matched.sort_by_key(|t| t.id);
        if filter.page > 0 && filter.page_size > 0 {
            let start = ((filter.page - 1) * filter.page_size) as usize;
            matched = matched
                .into_iter()
                .skip(start)
                .take(filter.page_size as usize)
                .collect();
        }
        Ok(matched)
    }

    async fn count(&self, filter: &TaskFilter) -> SchedulerResult<i64> {
        let mut unpaged = filter.clone();
        unpaged.page = 0;
        unpaged.page_size = 0;
        Ok(self.list(&unpaged).await?.len() as i64)
    }

    async fn get_enabled_major_tasks(&self) -> SchedulerResult<Vec<Task>> {
        let tasks = lock(&self.tasks);
        let mut matched: Vec<Task> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Enabled && t.level == TaskLevel::Major)
            .cloned()
            .collect();
        matched.sort_by_key(|t| t.id);
        Ok(matched)
    }

    async fn name_exists(&self, name: &str, excluding_id: i64) -> SchedulerResult<bool> {
        let tasks = lock(&self.tasks);
        Ok(tasks
            .values()
            .any(|t| t.name == name && t.id != excluding_id))
    }

    async fn get_status(&self, id: i64) -> SchedulerResult<Option<TaskStatus>> {
        Ok(lock(&self.tasks).get(&id).map(|t| t.status))
    }

    async fn update_status(&self, id: i64, status: TaskStatus) -> SchedulerResult<()> {
        let mut tasks = lock(&self.tasks);
        let task = tasks
            .get_mut(&id)
            .ok_or(SchedulerError::TaskNotFound { id })?;
        task.status = status;
        Ok(())
    }
}

/// 内存任务-主机关联存储，记录批量查询次数供断言
#[derive(Default)]
pub struct MemoryTaskHostRepository {
    rows: Mutex<Vec<TaskHost>>,
    hosts: Mutex<HashMap<i64, (String, i64)>>,
    pub query_count: AtomicUsize,
}

impl MemoryTaskHostRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记主机元数据，replace时用于填充主机名与端口
    pub fn seed_host(&self, host_id: i64, name: &str, port: i64) {
        lock(&self.hosts).insert(host_id, (name.to_string(), port));
    }

    pub fn queries_issued(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHostRepository for MemoryTaskHostRepository {
    async fn get_by_task_ids(&self, task_ids: &[i64]) -> SchedulerResult<Vec<TaskHost>> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        let rows = lock(&self.rows);
        Ok(rows
            .iter()
            .filter(|row| task_ids.contains(&row.task_id))
            .cloned()
            .collect())
    }

    async fn replace(&self, task_id: i64, host_ids: &[i64]) -> SchedulerResult<()> {
        let hosts = lock(&self.hosts);
        let mut rows = lock(&self.rows);
        rows.retain(|row| row.task_id != task_id);
        for host_id in host_ids {
            let (name, port) = hosts
                .get(host_id)
                .cloned()
                .unwrap_or_else(|| (format!("host-{host_id}"), 5921));
            rows.push(TaskHost {
                task_id,
                host_id: *host_id,
                name,
                alias: String::new(),
                port,
            });
        }
        Ok(())
    }

    async fn remove_by_task_id(&self, task_id: i64) -> SchedulerResult<()> {
        lock(&self.rows).retain(|row| row.task_id != task_id);
        Ok(())
    }

    async fn task_ids_for_host(&self, host_id: i64) -> SchedulerResult<Vec<i64>> {
        let rows = lock(&self.rows);
        let mut ids: Vec<i64> = rows
            .iter()
            .filter(|row| row.host_id == host_id)
            .map(|row| row.task_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

/// 内存执行日志存储
#[derive(Default)]
pub struct MemoryTaskLogRepository {
    logs: Mutex<Vec<TaskLog>>,
    next_id: AtomicI64,
}

impl MemoryTaskLogRepository {
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn all(&self) -> Vec<TaskLog> {
        lock(&self.logs).clone()
    }
}

#[async_trait]
impl TaskLogRepository for MemoryTaskLogRepository {
    async fn create(&self, log: &TaskLog) -> SchedulerResult<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = log.clone();
        stored.id = id;
        lock(&self.logs).push(stored);
        Ok(id)
    }

    async fn finish(&self, id: i64, status: TaskLogStatus, result: &str) -> SchedulerResult<()> {
        let mut logs = lock(&self.logs);
        let log = logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(SchedulerError::Internal(format!("执行日志 {id} 不存在")))?;
        log.status = status;
        log.result = result.to_string();
        log.end_time = Some(Utc::now());
        Ok(())
    }

    async fn list(&self, filter: &TaskLogFilter) -> SchedulerResult<Vec<TaskLog>> {
        let logs = lock(&self.logs);
        Ok(logs
            .iter()
            .filter(|l| filter.task_id.map_or(true, |id| l.task_id == id))
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .cloned()
            .collect())
    }

    async fn purge_older_than(&self, days: i64) -> SchedulerResult<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut logs = lock(&self.logs);
        let before = logs.len();
        logs.retain(|l| l.start_time >= cutoff);
        Ok((before - logs.len()) as u64)
    }
}

/// 内存配置存储
#[derive(Default)]
pub struct MemorySettingRepository {
    map: Mutex<HashMap<(String, String), String>>,
}

impl MemorySettingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, code: &str, key: &str, value: &str) {
        lock(&self.map).insert((code.to_string(), key.to_string()), value.to_string());
    }
}

#[async_trait]
impl SettingRepository for MemorySettingRepository {
    async fn get(&self, code: &str, key: &str) -> SchedulerResult<Option<String>> {
        Ok(lock(&self.map)
            .get(&(code.to_string(), key.to_string()))
            .cloned())
    }

    async fn set(&self, code: &str, key: &str, value: &str) -> SchedulerResult<()> {
        self.insert(code, key, value);
        Ok(())
    }

    async fn create_if_missing(
        &self,
        code: &str,
        key: &str,
        value: &str,
    ) -> SchedulerResult<bool> {
        let mut map = lock(&self.map);
        let entry_key = (code.to_string(), key.to_string());
        if map.contains_key(&entry_key) {
            return Ok(false);
        }
        map.insert(entry_key, value.to_string());
        Ok(true)
    }
}

/// 脚本化命令传输，按主机名返回预设结果并记录调用
pub struct ScriptedCommandTransport {
    outputs: Mutex<HashMap<String, ExecutionOutput>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl Default for ScriptedCommandTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCommandTransport {
    pub fn new() -> Self {
        Self {
            outputs: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_result(&self, hostname: &str, output: ExecutionOutput) {
        lock(&self.outputs).insert(hostname.to_string(), output);
    }

    /// 历史调用记录: (主机名, 命令)
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CommandTransport for ScriptedCommandTransport {
    async fn run(
        &self,
        host: &TaskHost,
        command: &str,
        _timeout: i64,
    ) -> SchedulerResult<ExecutionOutput> {
        lock(&self.calls).push((host.name.clone(), command.to_string()));
        let output = lock(&self.outputs)
            .get(&host.name)
            .cloned()
            .unwrap_or_else(|| ExecutionOutput::success("ok"));
        Ok(output)
    }
}

/// 脚本化HTTP传输
pub struct ScriptedHttpTransport {
    result: Mutex<ExecutionOutput>,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedHttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedHttpTransport {
    pub fn new() -> Self {
        Self {
            result: Mutex::new(ExecutionOutput::success("200 OK")),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_result(&self, output: ExecutionOutput) {
        *lock(&self.result) = output;
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedHttpTransport {
    async fn request(
        &self,
        _method: TaskHttpMethod,
        url: &str,
        _timeout: i64,
    ) -> SchedulerResult<ExecutionOutput> {
        lock(&self.calls).push(url.to_string());
        Ok(lock(&self.result).clone())
    }
}

/// 收集发送的通知供断言
#[derive(Default)]
pub struct CollectingSender {
    sent: Mutex<Vec<NotificationMessage>>,
}

impl CollectingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<NotificationMessage> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl NotificationSender for CollectingSender {
    async fn send(&self, message: &NotificationMessage) -> SchedulerResult<()> {
        lock(&self.sent).push(message.clone());
        Ok(())
    }
}

/// 总是发送失败的通知渠道
pub struct FailingSender;

#[async_trait]
impl NotificationSender for FailingSender {
    async fn send(&self, _message: &NotificationMessage) -> SchedulerResult<()> {
        Err(SchedulerError::Notification("渠道不可用".to_string()))
    }
}

/// 组装好全套内存依赖的执行分发器，供测试直接使用
pub struct DispatcherHarness {
    pub task_repo: Arc<MemoryTaskRepository>,
    pub host_repo: Arc<MemoryTaskHostRepository>,
    pub log_repo: Arc<MemoryTaskLogRepository>,
    pub setting_repo: Arc<MemorySettingRepository>,
    pub command_transport: Arc<ScriptedCommandTransport>,
    pub http_transport: Arc<ScriptedHttpTransport>,
    pub sender: Arc<CollectingSender>,
    pub dispatcher: Arc<ExecutionDispatcher>,
}

impl Default for DispatcherHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherHarness {
    pub fn new() -> Self {
        let task_repo = Arc::new(MemoryTaskRepository::new());
        let host_repo = Arc::new(MemoryTaskHostRepository::new());
        let log_repo = Arc::new(MemoryTaskLogRepository::new());
        let setting_repo = Arc::new(MemorySettingRepository::new());
        let command_transport = Arc::new(ScriptedCommandTransport::new());
        let http_transport = Arc::new(ScriptedHttpTransport::new());
        let sender = Arc::new(CollectingSender::new());

        let notifier = NotificationDispatcher::new(setting_repo.clone())
            .with_sender(NotifyChannel::Slack, sender.clone());
        let dispatcher = Arc::new(ExecutionDispatcher::new(
            task_repo.clone(),
            log_repo.clone(),
            TaskHostIndex::new(host_repo.clone()),
            command_transport.clone(),
            http_transport.clone(),
            notifier,
            16,
        ));

        Self {
            task_repo,
            host_repo,
            log_repo,
            setting_repo,
            command_transport,
            http_transport,
            sender,
            dispatcher,
        }
    }
}

/// 任务构造器
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new(
                "test_task".to_string(),
                TaskLevel::Major,
                TaskProtocol::Rpc,
                "echo hello".to_string(),
            ),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_level(mut self, level: TaskLevel) -> Self {
        self.task.level = level;
        self
    }

    pub fn with_spec(mut self, spec: &str) -> Self {
        self.task.spec = spec.to_string();
        self
    }

    pub fn with_protocol(mut self, protocol: TaskProtocol) -> Self {
        self.task.protocol = protocol;
        self
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.task.command = command.to_string();
        self
    }

    pub fn with_multi(mut self, multi: Multiplicity) -> Self {
        self.task.multi = multi;
        self
    }

    pub fn with_retry(mut self, times: i64, interval: i64) -> Self {
        self.task.retry_times = times;
        self.task.retry_interval = interval;
        self
    }

    pub fn with_dependencies(mut self, status: DependencyStatus, ids: Vec<i64>) -> Self {
        self.task.dependency_status = status;
        self.task.dependency_task_ids = ids;
        self
    }

    pub fn with_notify(
        mut self,
        status: NotifyStatus,
        channel: NotifyChannel,
        receivers: Vec<String>,
    ) -> Self {
        self.task.notify_status = status;
        self.task.notify_type = channel;
        self.task.notify_receiver_ids = receivers;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn enabled(self) -> Self {
        self.with_status(TaskStatus::Enabled)
    }

    pub fn build(self) -> Task {
        self.task
    }
}
