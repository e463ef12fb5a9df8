use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use cronserver_core::models::TaskHttpMethod;
use cronserver_core::traits::{ExecutionOutput, HttpTransport};
use cronserver_core::{SchedulerError, SchedulerResult};

/// HTTP协议任务的传输实现。2xx视为成功，响应体作为执行输出。
pub struct HttpTaskTransport {
    client: Client,
}

impl HttpTaskTransport {
    pub fn new() -> SchedulerResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SchedulerError::Transport(format!("构建HTTP客户端失败: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for HttpTaskTransport {
    async fn request(
        &self,
        method: TaskHttpMethod,
        url: &str,
        timeout: i64,
    ) -> SchedulerResult<ExecutionOutput> {
        debug!("执行HTTP任务: {:?} {}", method, url);

        let mut request = match method {
            TaskHttpMethod::Get => self.client.get(url),
            TaskHttpMethod::Post => self.client.post(url),
        };
        // timeout为0时不限制时长
        if timeout > 0 {
            request = request.timeout(Duration::from_secs(timeout as u64));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SchedulerError::ExecutionTimeout
            } else {
                SchedulerError::Transport(format!("请求 {url} 失败: {e}"))
            }
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        Ok(if status.is_success() {
            ExecutionOutput::success(body)
        } else {
            ExecutionOutput::failure(format!("HTTP状态码 {status}: {body}"))
        })
    }
}
