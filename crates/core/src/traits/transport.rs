use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SchedulerResult;
use crate::models::{TaskHost, TaskHttpMethod};

/// 单次执行尝试的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub success: bool,
    /// 命令输出或HTTP响应体，失败时为错误描述
    pub output: String,
}

impl ExecutionOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// 远程命令传输，在指定主机上执行命令
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// timeout为0时不限制执行时长
    async fn run(
        &self,
        host: &TaskHost,
        command: &str,
        timeout: i64,
    ) -> SchedulerResult<ExecutionOutput>;
}

/// HTTP传输，执行HTTP协议任务
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn request(
        &self,
        method: TaskHttpMethod,
        url: &str,
        timeout: i64,
    ) -> SchedulerResult<ExecutionOutput>;
}
