use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};
use crate::models::task::TaskProtocol;

/// 执行日志状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskLogStatus {
    #[serde(rename = "FAILURE")]
    Failure,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "FINISH")]
    Finish,
    #[serde(rename = "CANCEL")]
    Cancel,
}

impl TaskLogStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            TaskLogStatus::Failure => 0,
            TaskLogStatus::Running => 1,
            TaskLogStatus::Finish => 2,
            TaskLogStatus::Cancel => 3,
        }
    }

    pub fn from_i64(value: i64) -> SchedulerResult<Self> {
        match value {
            0 => Ok(TaskLogStatus::Failure),
            1 => Ok(TaskLogStatus::Running),
            2 => Ok(TaskLogStatus::Finish),
            3 => Ok(TaskLogStatus::Cancel),
            other => Err(SchedulerError::InvalidTaskParams(format!(
                "无效的TaskLogStatus取值: {other}"
            ))),
        }
    }
}

/// 一条执行日志对应一次传输层尝试，同一目标的重试通过retry_index区分
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: i64,
    pub task_id: i64,
    pub name: String,
    /// 触发来源标签: CRON表达式、手动运行或依赖触发
    pub spec: String,
    pub protocol: TaskProtocol,
    pub command: String,
    pub timeout: i64,
    /// 执行主机名，HTTP任务为空
    pub hostname: String,
    /// 同一目标的第几次尝试，0为首次，之后为重试
    pub retry_index: i64,
    pub status: TaskLogStatus,
    pub result: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TaskLog {
    pub fn start(
        task_id: i64,
        name: &str,
        spec: &str,
        protocol: TaskProtocol,
        command: &str,
        timeout: i64,
        hostname: &str,
        retry_index: i64,
    ) -> Self {
        Self {
            id: 0,
            task_id,
            name: name.to_string(),
            spec: spec.to_string(),
            protocol,
            command: command.to_string(),
            timeout,
            hostname: hostname.to_string(),
            retry_index,
            status: TaskLogStatus::Running,
            result: String::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }
}

/// 执行日志查询条件
#[derive(Debug, Clone, Default)]
pub struct TaskLogFilter {
    pub task_id: Option<i64>,
    pub status: Option<TaskLogStatus>,
    pub page: i64,
    pub page_size: i64,
}
