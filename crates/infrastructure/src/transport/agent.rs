use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cronserver_core::config::AgentConfig;
use cronserver_core::models::TaskHost;
use cronserver_core::traits::{CommandTransport, ExecutionOutput};
use cronserver_core::{SchedulerError, SchedulerResult};

/// 发给执行代理的命令请求
#[derive(Debug, Serialize)]
struct AgentRunRequest<'a> {
    command: &'a str,
    timeout: i64,
}

#[derive(Debug, Deserialize)]
struct AgentRunResponse {
    success: bool,
    output: String,
}

/// RPC协议任务的传输实现: 向目标主机上的执行代理发HTTP请求，
/// 代理在本机运行命令并回传输出。
pub struct AgentTransport {
    client: Client,
    scheme: String,
    api_path: String,
}

impl AgentTransport {
    pub fn new(config: &AgentConfig) -> SchedulerResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| SchedulerError::Transport(format!("构建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            scheme: config.scheme.clone(),
            api_path: config.api_path.clone(),
        })
    }
}

#[async_trait]
impl CommandTransport for AgentTransport {
    async fn run(
        &self,
        host: &TaskHost,
        command: &str,
        timeout: i64,
    ) -> SchedulerResult<ExecutionOutput> {
        let url = format!(
            "{}://{}:{}{}",
            self.scheme, host.name, host.port, self.api_path
        );
        debug!("向代理 {} 派发命令", url);

        let mut request = self
            .client
            .post(&url)
            .json(&AgentRunRequest { command, timeout });
        if timeout > 0 {
            request = request.timeout(Duration::from_secs(timeout as u64));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SchedulerError::ExecutionTimeout
            } else {
                SchedulerError::Transport(format!("请求代理 {} 失败: {e}", host.name))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(ExecutionOutput::failure(format!(
                "代理返回异常状态 {status}: {body}"
            )));
        }

        let body: AgentRunResponse = response
            .json()
            .await
            .map_err(|e| SchedulerError::Transport(format!("解析代理响应失败: {e}")))?;

        Ok(if body.success {
            ExecutionOutput::success(body.output)
        } else {
            ExecutionOutput::failure(body.output)
        })
    }
}
