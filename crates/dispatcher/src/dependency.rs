use std::sync::Arc;

use tracing::{debug, warn};

use cronserver_core::models::{DependencyStatus, Task};
use cronserver_core::traits::TaskRepository;
use cronserver_core::SchedulerResult;

/// 依赖解析器。父任务执行结束后决定哪些子任务需要触发。
pub struct DependencyResolver {
    task_repo: Arc<dyn TaskRepository>,
}

impl DependencyResolver {
    pub fn new(task_repo: Arc<dyn TaskRepository>) -> Self {
        Self { task_repo }
    }

    /// 依赖触发策略: 强依赖仅在父任务成功时触发，弱依赖无条件触发
    pub fn eligible_child_ids(parent: &Task, parent_success: bool) -> Vec<i64> {
        if parent.dependency_task_ids.is_empty() {
            return Vec::new();
        }
        if parent.dependency_status == DependencyStatus::Strong && !parent_success {
            debug!(
                "任务 {} 为强依赖且执行失败，不触发子任务",
                parent.id
            );
            return Vec::new();
        }
        parent.dependency_task_ids.clone()
    }

    /// 按列出顺序取回需要触发的子任务。
    /// 依赖触发绕过子任务自身的激活状态，子任务从不独立进入定时器。
    pub async fn resolve(&self, parent: &Task, parent_success: bool) -> SchedulerResult<Vec<Task>> {
        let child_ids = Self::eligible_child_ids(parent, parent_success);
        let mut children = Vec::with_capacity(child_ids.len());

        for child_id in child_ids {
            match self.task_repo.get_by_id(child_id).await? {
                Some(child) => children.push(child),
                None => {
                    warn!(
                        "任务 {} 的子任务 {} 不存在，跳过",
                        parent.id, child_id
                    );
                }
            }
        }

        Ok(children)
    }
}
