use std::sync::Arc;
use std::time::Duration;

use taskhub_core::{models::WorkerRegistration, traits::ExecutorRegistry, WorkerConfig};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{DispatcherGateway, HeartbeatManager, TaskExecutionManager};
use crate::system_info::{self, SystemSnapshot};

/// 单个Worker进程的生命周期
///
/// 注册（失败时无限重试）→ 启动心跳 → 拉取并逐个执行任务，直到收到关闭信号。
/// 心跳发现Worker未被识别时由心跳任务重新注册。
/// 正在执行的任务不会被关闭信号打断。
pub struct WorkerLifecycle {
    worker_id: String,
    task_types: Vec<String>,
    registration_retry_delay: Duration,
    poll_interval: Duration,
    poll_error_delay: Duration,
    poll_wait: Duration,
    gateway: Arc<dyn DispatcherGateway>,
    execution: TaskExecutionManager,
    heartbeat: Arc<HeartbeatManager>,
}

impl WorkerLifecycle {
    pub fn new(
        worker_id: String,
        config: &WorkerConfig,
        gateway: Arc<dyn DispatcherGateway>,
        executors: ExecutorRegistry,
    ) -> Self {
        let execution = TaskExecutionManager::new(
            worker_id.clone(),
            Arc::clone(&gateway),
            executors,
            config.status_report_policy(),
            config.execution_backoff.clone(),
        );
        let heartbeat = Arc::new(HeartbeatManager::new(
            worker_id.clone(),
            Arc::clone(&gateway),
            config.heartbeat_interval(),
            Arc::new(system_info::memory_available),
        ));

        Self {
            worker_id,
            task_types: config.task_types.clone(),
            registration_retry_delay: config.registration_retry_delay(),
            poll_interval: config.poll_interval(),
            poll_error_delay: config.poll_error_delay(),
            poll_wait: Duration::from_secs(config.poll_wait_seconds),
            gateway,
            execution,
            heartbeat,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let supported = self.execution.supported_task_types();
        for task_type in &self.task_types {
            if !supported.contains(task_type) {
                warn!(
                    "任务类型 '{}' 没有注册执行器，拉取到的任务将被标记为失败",
                    task_type
                );
            }
        }

        let registration = SystemSnapshot::collect().registration(&self.worker_id);
        if !self.register(&registration, &mut shutdown_rx).await {
            info!("Worker {} 在注册完成前收到关闭信号", self.worker_id);
            return;
        }

        let heartbeat_handle =
            Arc::clone(&self.heartbeat).start(registration, shutdown_rx.resubscribe());
        info!(
            "Worker {} 开始拉取任务，任务类型: {:?}",
            self.worker_id, self.task_types
        );

        self.poll_loop(&mut shutdown_rx).await;

        if let Err(e) = heartbeat_handle.await {
            error!("心跳任务异常退出: {}", e);
        }
        info!("Worker {} 已停止", self.worker_id);
    }

    /// 注册直到成功；收到关闭信号时返回 `false`
    async fn register(
        &self,
        registration: &WorkerRegistration,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> bool {
        let mut attempt: u64 = 1;
        loop {
            let result = tokio::select! {
                result = self.gateway.register(registration) => result,
                _ = shutdown_rx.recv() => return false,
            };

            match result {
                Ok(()) => {
                    info!(
                        "Worker {} 注册成功 (平台: {}, CPU: {})",
                        self.worker_id, registration.platform, registration.cpu_count
                    );
                    return true;
                }
                Err(e) => {
                    warn!(
                        "Worker {} 第 {} 次注册失败: {}，{:?} 后重试",
                        self.worker_id, attempt, e, self.registration_retry_delay
                    );
                    attempt += 1;
                    if !self.pause(self.registration_retry_delay, shutdown_rx).await {
                        return false;
                    }
                }
            }
        }
    }

    async fn poll_loop(&self, shutdown_rx: &mut broadcast::Receiver<()>) {
        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                polled = self.gateway.next_task(&self.task_types, self.poll_wait) => polled,
            };

            let delay = match polled {
                Ok(Some(entry)) => {
                    let task_id = entry.task_id.clone();
                    let outcome = self.execution.handle(entry).await;
                    debug!("任务 {} 处理结束: {:?}", task_id, outcome);
                    continue;
                }
                Ok(None) => self.poll_interval,
                Err(e) => {
                    warn!("拉取任务失败，稍后重试: {}", e);
                    self.poll_error_delay
                }
            };

            if !self.pause(delay, shutdown_rx).await {
                break;
            }
        }
    }

    /// 等待一段时间；期间收到关闭信号时返回 `false`
    async fn pause(&self, delay: Duration, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown_rx.recv() => false,
        }
    }
}
