use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use taskhub_core::{
    models::{QueueEntry, TaskStatusUpdate, WorkerHeartbeat, WorkerRegistration},
    TaskHubError, TaskHubResult,
};
use tracing::debug;

/// Worker与分发服务之间的通信接口
#[async_trait]
pub trait DispatcherGateway: Send + Sync {
    async fn register(&self, registration: &WorkerRegistration) -> TaskHubResult<()>;

    async fn heartbeat(&self, heartbeat: &WorkerHeartbeat) -> TaskHubResult<()>;

    /// 拉取下一个任务，服务端最多阻塞 `wait`
    async fn next_task(
        &self,
        task_types: &[String],
        wait: Duration,
    ) -> TaskHubResult<Option<QueueEntry>>;

    async fn update_task(&self, update: &TaskStatusUpdate) -> TaskHubResult<()>;
}

#[derive(Debug, Deserialize)]
struct NextTaskBody {
    task: Option<QueueEntry>,
}

/// 基于HTTP的分发服务客户端
pub struct DispatcherClient {
    base_url: String,
    http_client: Client,
}

impl DispatcherClient {
    pub fn new(dispatcher_url: &str, request_timeout: Duration) -> TaskHubResult<Self> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TaskHubError::Configuration(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            base_url: dispatcher_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> TaskHubResult<reqwest::Response> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(TaskHubError::Http {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> TaskHubResult<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| TaskHubError::Serialization(format!("解析响应失败: {e}")))
    }
}

fn network_error(e: reqwest::Error) -> TaskHubError {
    TaskHubError::Network(e.to_string())
}

#[async_trait]
impl DispatcherGateway for DispatcherClient {
    async fn register(&self, registration: &WorkerRegistration) -> TaskHubResult<()> {
        let request = self
            .http_client
            .post(self.url("/api/register_worker"))
            .json(registration);
        self.send(request).await?;
        Ok(())
    }

    async fn heartbeat(&self, heartbeat: &WorkerHeartbeat) -> TaskHubResult<()> {
        let request = self
            .http_client
            .post(self.url("/api/update_worker"))
            .json(heartbeat);
        self.send(request).await?;
        Ok(())
    }

    async fn next_task(
        &self,
        task_types: &[String],
        wait: Duration,
    ) -> TaskHubResult<Option<QueueEntry>> {
        let task_type = task_types.join(",");
        // timeout=0 在服务端表示一直等待，至少请求1秒
        let timeout = wait.as_secs().max(1).to_string();
        let request = self
            .http_client
            .get(self.url("/api/next_task"))
            .query(&[("task_type", task_type.as_str()), ("timeout", timeout.as_str())]);

        let body: NextTaskBody = self.send_json(request).await?;
        if let Some(entry) = &body.task {
            debug!("拉取到任务 {} (类型: {})", entry.task_id, entry.task_type);
        }
        Ok(body.task)
    }

    async fn update_task(&self, update: &TaskStatusUpdate) -> TaskHubResult<()> {
        let request = self
            .http_client
            .post(self.url("/api/update_task"))
            .json(update);
        self.send(request).await?;
        Ok(())
    }
}
