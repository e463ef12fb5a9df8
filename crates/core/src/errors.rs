use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("任务名称已存在: {name}")]
    TaskNameExists { name: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("不允许设置当前任务为子任务: {id}")]
    SelfDependency { id: i64 },

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("任务 {task_id} 没有可执行的主机")]
    NoTargetHost { task_id: i64 },

    #[error("任务执行超时")]
    ExecutionTimeout,

    #[error("传输错误: {0}")]
    Transport(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// 校验类错误在保存任务前同步返回给调用方，不会落库
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskNameExists { .. }
                | SchedulerError::InvalidCron { .. }
                | SchedulerError::SelfDependency { .. }
                | SchedulerError::InvalidTaskParams(_)
        )
    }
}
