use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use cronserver_core::models::Task;
use cronserver_core::traits::ExecutionOutput;

/// 重试策略: 固定间隔，retry_times为首次之外的额外尝试次数
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retry_times: u32,
    pub retry_interval: Duration,
}

impl RetryPolicy {
    pub fn from_task(task: &Task) -> Self {
        Self {
            retry_times: task.retry_times.clamp(0, 10) as u32,
            retry_interval: Duration::from_secs(task.retry_interval.clamp(0, 3600) as u64),
        }
    }
}

/// 一次带重试的执行结果
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub output: ExecutionOutput,
    /// 实际发起的尝试次数，至少为1
    pub attempts: u32,
}

/// 重试控制器。包装单次执行尝试，失败后按固定间隔重试，
/// 直到成功或额外尝试次数耗尽，最后一次失败作为终态返回。
pub struct RetryController;

impl RetryController {
    /// attempt接收尝试序号（0为首次），每次调用对应一条执行日志。
    /// 取消信号只阻止后续重试的排期，不丢弃已产生的终态结果。
    pub async fn execute<F, Fut>(
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> AttemptResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ExecutionOutput>,
    {
        let mut attempts = 1u32;
        let mut last = attempt(0).await;

        while !last.success && attempts <= policy.retry_times {
            if cancel.is_cancelled() {
                warn!("任务已取消，停止重试，保留当前终态结果");
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("重试等待期间收到取消信号，停止重试");
                    break;
                }
                _ = tokio::time::sleep(policy.retry_interval) => {}
            }
            debug!("第 {} 次重试，共允许 {} 次", attempts, policy.retry_times);
            last = attempt(attempts).await;
            attempts += 1;
        }

        AttemptResult {
            output: last,
            attempts,
        }
    }
}
