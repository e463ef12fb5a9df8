use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use cronserver_core::models::TaskHost;
use cronserver_core::traits::TaskHostRepository;
use cronserver_core::SchedulerResult;

/// 任务-主机批量解析层。
/// N个任务的主机归属用一次批量查询取回后在内存分组，
/// 替代历史上每任务一次查询的模式。
pub struct TaskHostIndex {
    repo: Arc<dyn TaskHostRepository>,
}

impl TaskHostIndex {
    pub fn new(repo: Arc<dyn TaskHostRepository>) -> Self {
        Self { repo }
    }

    /// 解析任务ID集合的主机归属。
    /// 空集合直接返回空映射，不发起查询；
    /// 未分配主机的任务ID在结果中映射为空列表，不报错。
    pub async fn hosts_for_tasks(
        &self,
        task_ids: &[i64],
    ) -> SchedulerResult<HashMap<i64, Vec<TaskHost>>> {
        if task_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self.repo.get_by_task_ids(task_ids).await?;
        debug!("批量解析 {} 个任务的主机归属，命中 {} 条关联", task_ids.len(), rows.len());

        let mut map: HashMap<i64, Vec<TaskHost>> =
            task_ids.iter().map(|id| (*id, Vec::new())).collect();
        for row in rows {
            if let Some(hosts) = map.get_mut(&row.task_id) {
                hosts.push(row);
            }
        }

        Ok(map)
    }

    /// 整体替换任务的主机集合
    pub async fn add(&self, task_id: i64, host_ids: &[i64]) -> SchedulerResult<()> {
        self.repo.replace(task_id, host_ids).await
    }

    /// 删除任务的全部主机关联，幂等
    pub async fn remove(&self, task_id: i64) -> SchedulerResult<()> {
        self.repo.remove_by_task_id(task_id).await
    }

    /// 反向查询: 分配到指定主机的任务ID集合
    pub async fn task_ids_for_host(&self, host_id: i64) -> SchedulerResult<Vec<i64>> {
        self.repo.task_ids_for_host(host_id).await
    }
}
