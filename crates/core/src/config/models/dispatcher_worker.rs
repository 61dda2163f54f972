use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 提交时未指定重试预算的默认值
    pub default_retry_budget: i32,
    /// 超过该时长未收到心跳的Worker视为失联
    pub worker_timeout_seconds: i64,
    /// 状态写入遇到版本冲突时的最多尝试次数
    pub status_write_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_retry_budget: crate::models::DEFAULT_RETRY_BUDGET,
            worker_timeout_seconds: 15,
            status_write_attempts: 3,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_retry_budget < 1 {
            return Err(anyhow::anyhow!("默认重试预算必须大于0"));
        }

        if self.worker_timeout_seconds <= 0 {
            return Err(anyhow::anyhow!("Worker超时时间必须大于0"));
        }

        if self.status_write_attempts == 0 {
            return Err(anyhow::anyhow!("状态写入尝试次数必须大于0"));
        }

        Ok(())
    }
}

/// 执行重试的等待策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionBackoffConfig {
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for ExecutionBackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            jitter: false,
        }
    }
}

impl ExecutionBackoffConfig {
    /// 构造执行重试策略，尝试次数由任务的重试预算决定
    pub fn policy(&self, max_attempts: u32) -> RetryPolicy {
        let base = Duration::from_millis(self.base_delay_ms);
        match self.strategy {
            BackoffStrategy::Fixed => RetryPolicy::fixed(max_attempts, base),
            BackoffStrategy::Exponential => RetryPolicy::exponential(
                max_attempts,
                base,
                Duration::from_millis(self.max_delay_ms),
                self.jitter,
            ),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.strategy == BackoffStrategy::Exponential && self.max_delay_ms < self.base_delay_ms
        {
            return Err(anyhow::anyhow!("最大退避时间不能小于基础退避时间"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// 未配置时启动时生成一次
    pub worker_id: Option<String>,
    pub dispatcher_url: String,
    /// 拉取任务的分区，按优先级排列
    pub task_types: Vec<String>,
    pub registration_retry_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// 未取到任务时的等待间隔
    pub poll_interval_ms: u64,
    /// 拉取任务出现传输错误后的等待间隔
    pub poll_error_delay_ms: u64,
    /// 每次拉取时服务端阻塞等待的时长
    pub poll_wait_seconds: u64,
    pub request_timeout_seconds: u64,
    pub status_report_attempts: u32,
    pub status_report_delay_ms: u64,
    pub execution_backoff: ExecutionBackoffConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            worker_id: None,
            dispatcher_url: "http://127.0.0.1:8080".to_string(),
            task_types: vec!["test".to_string()],
            registration_retry_delay_ms: 5000,
            heartbeat_interval_ms: 5000,
            poll_interval_ms: 1000,
            poll_error_delay_ms: 1000,
            poll_wait_seconds: 20,
            request_timeout_seconds: 30,
            status_report_attempts: 3,
            status_report_delay_ms: 1000,
            execution_backoff: ExecutionBackoffConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(worker_id) = &self.worker_id {
            if worker_id.trim().is_empty() {
                return Err(anyhow::anyhow!("Worker ID不能为空"));
            }
        }

        if !self.dispatcher_url.starts_with("http://") && !self.dispatcher_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "Dispatcher地址格式无效: {}",
                self.dispatcher_url
            ));
        }

        if self.task_types.is_empty() {
            return Err(anyhow::anyhow!("任务类型不能为空"));
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        if self.poll_wait_seconds >= self.request_timeout_seconds {
            return Err(anyhow::anyhow!(
                "拉取等待时长({}s)必须小于请求超时时间({}s)",
                self.poll_wait_seconds,
                self.request_timeout_seconds
            ));
        }

        if self.status_report_attempts == 0 {
            return Err(anyhow::anyhow!("状态上报尝试次数必须大于0"));
        }

        self.execution_backoff.validate()?;

        Ok(())
    }

    /// 一次状态上报在全部重试耗尽前可能占用的最长时间
    pub fn status_report_window(&self) -> Duration {
        let attempts = u64::from(self.status_report_attempts);
        Duration::from_secs(attempts * self.request_timeout_seconds)
            + Duration::from_millis(attempts * self.status_report_delay_ms)
    }

    /// 状态上报的传输重试策略
    pub fn status_report_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.status_report_attempts,
            Duration::from_millis(self.status_report_delay_ms),
        )
    }

    pub fn registration_retry_delay(&self) -> Duration {
        Duration::from_millis(self.registration_retry_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_error_delay(&self) -> Duration {
        Duration::from_millis(self.poll_error_delay_ms)
    }
}
