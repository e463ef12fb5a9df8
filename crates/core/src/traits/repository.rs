use async_trait::async_trait;

use crate::errors::SchedulerResult;
use crate::models::{
    Host, Task, TaskFilter, TaskHost, TaskLog, TaskLogFilter, TaskLogStatus, TaskStatus,
};

/// 任务存储
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 创建任务，返回数据库分配的ID
    async fn create(&self, task: &Task) -> SchedulerResult<i64>;

    /// 按ID整体更新任务定义
    async fn update(&self, task: &Task) -> SchedulerResult<()>;

    async fn delete(&self, id: i64) -> SchedulerResult<()>;

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>>;

    /// 按条件分页查询
    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>>;

    async fn count(&self, filter: &TaskFilter) -> SchedulerResult<i64>;

    /// 调度器初始化时批量加载: 已激活的主任务
    async fn get_enabled_major_tasks(&self) -> SchedulerResult<Vec<Task>>;

    /// 任务名唯一性检查，更新场景排除自身ID
    async fn name_exists(&self, name: &str, excluding_id: i64) -> SchedulerResult<bool>;

    async fn get_status(&self, id: i64) -> SchedulerResult<Option<TaskStatus>>;

    async fn update_status(&self, id: i64, status: TaskStatus) -> SchedulerResult<()>;
}

/// 任务-主机关联存储
#[async_trait]
pub trait TaskHostRepository: Send + Sync {
    /// 按任务ID集合批量查询主机关联，一次查询取回全部，调用方在内存分组
    async fn get_by_task_ids(&self, task_ids: &[i64]) -> SchedulerResult<Vec<TaskHost>>;

    /// 整体替换任务的主机集合，删除加插入作为一个事务提交
    async fn replace(&self, task_id: i64, host_ids: &[i64]) -> SchedulerResult<()>;

    /// 删除任务的全部主机关联，幂等
    async fn remove_by_task_id(&self, task_id: i64) -> SchedulerResult<()>;

    /// 反向查询: 分配到指定主机的任务ID集合
    async fn task_ids_for_host(&self, host_id: i64) -> SchedulerResult<Vec<i64>>;
}

/// 主机存储
#[async_trait]
pub trait HostRepository: Send + Sync {
    async fn create(&self, host: &Host) -> SchedulerResult<i64>;

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Host>>;

    async fn list(&self) -> SchedulerResult<Vec<Host>>;

    /// 删除主机，同时级联清理任务-主机关联
    async fn delete(&self, id: i64) -> SchedulerResult<()>;
}

/// 执行日志存储，一条记录对应一次传输层尝试
#[async_trait]
pub trait TaskLogRepository: Send + Sync {
    async fn create(&self, log: &TaskLog) -> SchedulerResult<i64>;

    /// 尝试结束时回写状态与输出
    async fn finish(&self, id: i64, status: TaskLogStatus, result: &str) -> SchedulerResult<()>;

    async fn list(&self, filter: &TaskLogFilter) -> SchedulerResult<Vec<TaskLog>>;

    /// 按保留天数清理历史日志，返回删除的行数
    async fn purge_older_than(&self, days: i64) -> SchedulerResult<u64>;
}

/// 配置存储，(code, key)定位一条配置
#[async_trait]
pub trait SettingRepository: Send + Sync {
    async fn get(&self, code: &str, key: &str) -> SchedulerResult<Option<String>>;

    async fn set(&self, code: &str, key: &str, value: &str) -> SchedulerResult<()>;

    /// 缺失时创建，返回是否新建了记录
    async fn create_if_missing(&self, code: &str, key: &str, value: &str)
        -> SchedulerResult<bool>;
}
