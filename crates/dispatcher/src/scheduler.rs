use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cronserver_core::models::{Task, TaskLevel};
use cronserver_core::traits::TaskRepository;
use cronserver_core::SchedulerResult;

use crate::cron_utils::CronScheduler;
use crate::execution::{ExecutionDispatcher, Trigger};

/// 定时器注册表中的一个槽位
struct TimerEntry {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 调度核心。持有以任务ID为键的定时器注册表，
/// 到点后通过执行分发器触发任务。
/// 定时器只保存任务ID，到点时重新读取任务详情，
/// 管理端的修改无需刷新内存副本即可生效。
pub struct SchedulerCore {
    task_repo: Arc<dyn TaskRepository>,
    dispatcher: Arc<ExecutionDispatcher>,
    timers: Mutex<HashMap<i64, TimerEntry>>,
}

impl SchedulerCore {
    pub fn new(task_repo: Arc<dyn TaskRepository>, dispatcher: Arc<ExecutionDispatcher>) -> Self {
        Self {
            task_repo,
            dispatcher,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// 进程启动时批量加载已激活的主任务并逐个装入定时器。
    /// 单个任务的表达式解析失败只记录日志并跳过，不中断其余任务的初始化。
    pub async fn initialize(&self) -> SchedulerResult<usize> {
        info!("开始初始化定时器注册表");
        let tasks = self.task_repo.get_enabled_major_tasks().await?;
        let mut armed = 0;

        for task in tasks {
            match self.add(&task) {
                Ok(()) => armed += 1,
                Err(e) => {
                    error!("任务 {} ({}) 装入定时器失败，已跳过: {}", task.id, task.name, e);
                }
            }
        }

        info!("定时器初始化完成，共装入 {} 个任务", armed);
        Ok(armed)
    }

    /// 为任务装入定时器。已有同ID定时器时先完全拆除旧的再装新的，
    /// 避免新旧定时器并存造成的重复触发。
    pub fn add(&self, task: &Task) -> SchedulerResult<()> {
        // 先解析表达式，解析失败时保持现有定时器不变
        let schedule = CronScheduler::new(&task.spec)?;

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = timers.remove(&task.id) {
            old.cancel.cancel();
            old.handle.abort();
            debug!("任务 {} 的旧定时器已拆除", task.id);
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(timer_loop(
            task.id,
            schedule,
            cancel.clone(),
            self.task_repo.clone(),
            self.dispatcher.clone(),
        ));
        timers.insert(task.id, TimerEntry { cancel, handle });

        info!("任务 {} ({}) 已装入定时器, 表达式: {}", task.id, task.name, task.spec);
        Ok(())
    }

    /// 替换任务的定时器，与add等价，保留与管理端一致的语义化入口
    pub fn remove_and_add(&self, task: &Task) -> SchedulerResult<()> {
        self.add(task)
    }

    /// 拆除任务的定时器，无定时器时为空操作
    pub fn remove(&self, task_id: i64) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = timers.remove(&task_id) {
            entry.cancel.cancel();
            entry.handle.abort();
            info!("任务 {} 已从定时器移除", task_id);
        }
    }

    /// 绕过定时器立即执行一次，用于手动运行
    pub fn run(&self, task: Task) {
        info!("手动运行任务 {} ({})", task.id, task.name);
        let fut = self.dispatcher.clone().dispatch(task, Trigger::Manual);
        tokio::spawn(fut);
    }

    /// 任务是否占用定时器槽位
    pub fn is_armed(&self, task_id: i64) -> bool {
        let timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.contains_key(&task_id)
    }

    /// 当前装入定时器的任务数量
    pub fn armed_count(&self) -> usize {
        let timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.len()
    }

    /// 拆除全部定时器，进程停止时调用
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        let count = timers.len();
        for (_, entry) in timers.drain() {
            entry.cancel.cancel();
            entry.handle.abort();
        }
        info!("已拆除全部 {} 个定时器", count);
    }

    /// 根据CRON表达式计算下次执行时间，纯函数，不触碰调度状态。
    /// 子任务与空表达式返回None，解析失败也返回None。
    pub fn next_run_time(task: &Task, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if task.level == TaskLevel::Minor || task.spec.is_empty() {
            return None;
        }
        match CronScheduler::new(&task.spec) {
            Ok(scheduler) => scheduler.next_execution_time(now),
            Err(_) => None,
        }
    }
}

impl Drop for SchedulerCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 单个任务的定时循环: 算下一次执行时间，睡到点，
/// 重新读取任务详情后派发执行，任务被禁用或删除时自行退出。
async fn timer_loop(
    task_id: i64,
    schedule: CronScheduler,
    cancel: CancellationToken,
    task_repo: Arc<dyn TaskRepository>,
    dispatcher: Arc<ExecutionDispatcher>,
) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_execution_time(now) else {
            warn!("任务 {} 无法计算下一次执行时间，定时器退出", task_id);
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!("任务 {} 下次执行时间: {}", task_id, next.format("%Y-%m-%d %H:%M:%S UTC"));

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("任务 {} 的定时器收到取消信号", task_id);
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        // 到点后重新取任务详情，管理端的编辑即时生效
        match task_repo.get_by_id(task_id).await {
            Ok(Some(task)) if task.is_enabled() => {
                let fut = dispatcher.clone().dispatch(task, Trigger::Schedule);
                // 执行在独立任务中进行，不阻塞本定时循环
                tokio::spawn(fut);
            }
            Ok(Some(task)) => {
                info!("任务 {} 已不处于激活状态 ({:?})，定时器退出", task_id, task.status);
                return;
            }
            Ok(None) => {
                info!("任务 {} 已被删除，定时器退出", task_id);
                return;
            }
            Err(e) => {
                error!("读取任务 {} 失败: {}，本次触发跳过", task_id, e);
            }
        }
    }
}
