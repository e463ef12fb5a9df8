use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use cronserver_core::models::{Task, TaskFilter, TaskHost};
use cronserver_core::traits::TaskRepository;
use cronserver_core::SchedulerResult;

use crate::host_index::TaskHostIndex;
use crate::scheduler::SchedulerCore;

/// 列表页展示用的任务视图: 任务定义加上主机归属与下次执行时间
#[derive(Debug, Clone)]
pub struct TaskView {
    pub task: Task,
    pub hosts: Vec<TaskHost>,
    pub next_run_time: Option<DateTime<Utc>>,
}

/// 一页任务列表与未分页的总数
#[derive(Debug, Clone)]
pub struct TaskPage {
    pub total: i64,
    pub tasks: Vec<TaskView>,
}

/// 任务列表查询服务。
/// 整页任务的主机归属用一次批量查询装配，
/// 下次执行时间在读取时计算，从不落库。
pub struct TaskQueryService {
    task_repo: Arc<dyn TaskRepository>,
    host_index: TaskHostIndex,
}

impl TaskQueryService {
    pub fn new(task_repo: Arc<dyn TaskRepository>, host_index: TaskHostIndex) -> Self {
        Self {
            task_repo,
            host_index,
        }
    }

    /// 分页查询任务列表。host_id不为空时先反查该主机的任务ID集合，
    /// 在内存中求交后再分页。
    pub async fn list(
        &self,
        filter: &TaskFilter,
        host_id: Option<i64>,
    ) -> SchedulerResult<TaskPage> {
        let (total, tasks) = match host_id {
            Some(host_id) => self.list_by_host(filter, host_id).await?,
            None => {
                let total = self.task_repo.count(filter).await?;
                let tasks = self.task_repo.list(filter).await?;
                (total, tasks)
            }
        };

        let views = self.decorate(tasks).await?;
        Ok(TaskPage {
            total,
            tasks: views,
        })
    }

    async fn list_by_host(
        &self,
        filter: &TaskFilter,
        host_id: i64,
    ) -> SchedulerResult<(i64, Vec<Task>)> {
        let assigned = self.host_index.task_ids_for_host(host_id).await?;
        if assigned.is_empty() {
            return Ok((0, Vec::new()));
        }

        // 其余条件交给存储层，主机条件与分页在内存完成
        let mut unpaged = filter.clone();
        unpaged.page = 0;
        unpaged.page_size = 0;
        let mut tasks = self.task_repo.list(&unpaged).await?;
        tasks.retain(|t| assigned.contains(&t.id));

        let total = tasks.len() as i64;
        if filter.page > 0 && filter.page_size > 0 {
            let start = ((filter.page - 1) * filter.page_size) as usize;
            tasks = tasks
                .into_iter()
                .skip(start)
                .take(filter.page_size as usize)
                .collect();
        }
        Ok((total, tasks))
    }

    /// 整页装配: 主机归属一次批量查询，下次执行时间逐个计算
    async fn decorate(&self, tasks: Vec<Task>) -> SchedulerResult<Vec<TaskView>> {
        let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
        let mut host_map = self.host_index.hosts_for_tasks(&ids).await?;
        debug!("装配任务列表页, 共 {} 个任务", tasks.len());

        let now = Utc::now();
        Ok(tasks
            .into_iter()
            .map(|task| {
                let hosts = host_map.remove(&task.id).unwrap_or_default();
                let next_run_time = SchedulerCore::next_run_time(&task, now);
                TaskView {
                    task,
                    hosts,
                    next_run_time,
                }
            })
            .collect())
    }
}
