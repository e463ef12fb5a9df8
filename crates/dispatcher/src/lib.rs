//! 调度与分发引擎: 定时器注册表、执行扇出、重试控制、
//! 依赖链触发、主机批量解析与通知分发。

pub mod admin;
pub mod cron_utils;
pub mod dependency;
pub mod execution;
pub mod host_index;
pub mod notify;
pub mod query;
pub mod retention;
pub mod retry;
pub mod scheduler;
pub mod testing;

pub use admin::{TaskAdminService, TaskForm};
pub use cron_utils::CronScheduler;
pub use dependency::DependencyResolver;
pub use execution::{
    ExecutionDispatcher, HostResult, OccurrenceOutcome, Trigger, DEPENDENCY_RUN_LABEL,
    MANUAL_RUN_LABEL,
};
pub use host_index::TaskHostIndex;
pub use notify::NotificationDispatcher;
pub use query::{TaskPage, TaskQueryService, TaskView};
pub use retention::LogRetentionSweeper;
pub use retry::{AttemptResult, RetryController, RetryPolicy};
pub use scheduler::SchedulerCore;
