use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use taskhub_core::{
    config::models::{DispatcherConfig, QueueConfig},
    models::{
        NewTask, QueueEntry, Task, TaskFilter, TaskPatch, TaskStatus, TaskStatusUpdate,
        WorkerHeartbeat, WorkerInfo, WorkerRegistration, WorkerView,
    },
    traits::{TaskQueue, TaskRepository, WorkerRepository},
    TaskHubError, TaskHubResult,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// 入队失败时写入任务的错误信息
pub const ENQUEUE_FAILED_MESSAGE: &str = "failed to enqueue task";

/// 任务分发服务
///
/// 对外提供任务提交、查询、状态写入，Worker注册与心跳，以及任务拉取。
/// 所有依赖在构造时显式传入。
pub struct DispatcherService {
    task_repo: Arc<dyn TaskRepository>,
    worker_repo: Arc<dyn WorkerRepository>,
    queue: Arc<dyn TaskQueue>,
    config: DispatcherConfig,
    queue_config: QueueConfig,
}

impl DispatcherService {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        worker_repo: Arc<dyn WorkerRepository>,
        queue: Arc<dyn TaskQueue>,
        config: DispatcherConfig,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            task_repo,
            worker_repo,
            queue,
            config,
            queue_config,
        }
    }

    pub fn default_partitions(&self) -> &[String] {
        &self.queue_config.default_partitions
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_config.visibility_timeout_seconds)
    }

    /// 提交任务：写入任务记录（pending）后推入同名分区
    ///
    /// 入队失败时尽力把任务标记为 `failed`，再把队列错误返回给调用方。
    pub async fn submit_task(&self, request: NewTask) -> TaskHubResult<Task> {
        let task_type = request.task_type.trim();
        if task_type.is_empty() {
            return Err(TaskHubError::InvalidTaskParams(
                "task_type不能为空".to_string(),
            ));
        }

        let retry_budget = request
            .retry_budget
            .unwrap_or(self.config.default_retry_budget);
        if retry_budget < 1 {
            return Err(TaskHubError::InvalidTaskParams(format!(
                "retry_budget必须大于0，收到 {retry_budget}"
            )));
        }

        let task = self
            .task_repo
            .create(&Task::new(task_type, request.payload, retry_budget))
            .await?;

        let entry = QueueEntry::from_task(&task);
        if let Err(e) = self.queue.push(&task.task_type, &entry).await {
            error!("任务 {} 入队失败: {}", task.id, e);
            let patch = TaskPatch {
                status: Some(TaskStatus::Failed),
                error_message: Some(ENQUEUE_FAILED_MESSAGE.to_string()),
                expected_version: Some(task.version),
                ..Default::default()
            };
            if let Err(mark_err) = self.task_repo.update(&task.id, &patch).await {
                warn!("标记任务 {} 入队失败时出错: {}", task.id, mark_err);
            }
            return Err(e);
        }

        counter!("taskhub_tasks_submitted_total", "task_type" => task.task_type.clone())
            .increment(1);
        info!(
            "任务已提交: {} (类型: {}, 重试预算: {})",
            task.id, task.task_type, task.retry_budget
        );
        Ok(task)
    }

    pub async fn get_task(&self, id: &str) -> TaskHubResult<Task> {
        self.task_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| TaskHubError::TaskNotFound { id: id.to_string() })
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> TaskHubResult<Vec<Task>> {
        self.task_repo.list(filter).await
    }

    /// Worker上报的状态写入
    ///
    /// 读取当前记录、校验转换后按读到的版本条件写入；并发写入导致版本冲突时
    /// 重新读取，最多 `status_write_attempts` 次。任务离开 `pending` 时确认队列认领。
    pub async fn update_task_status(&self, update: TaskStatusUpdate) -> TaskHubResult<Task> {
        let max_attempts = self.config.status_write_attempts.max(1);
        let mut attempt = 1;

        loop {
            let current = self.get_task(&update.task_id).await?;
            let patch = current.apply(&update)?;

            match self.task_repo.update(&current.id, &patch).await {
                Ok(updated) => {
                    if current.status == TaskStatus::Pending && updated.status != TaskStatus::Pending
                    {
                        self.acknowledge(&updated.id).await;
                    }
                    if updated.is_terminal() {
                        counter!(
                            "taskhub_tasks_finished_total",
                            "task_type" => updated.task_type.clone(),
                            "status" => updated.status.as_str()
                        )
                        .increment(1);
                        info!(
                            "任务 {} 已结束: {} (耗时: {:?}s)",
                            updated.id, updated.status, updated.duration
                        );
                    } else {
                        debug!("任务 {} 状态更新为 {}", updated.id, updated.status);
                    }
                    return Ok(updated);
                }
                Err(TaskHubError::VersionConflict { .. }) if attempt < max_attempts => {
                    debug!(
                        "任务 {} 状态写入版本冲突，重新读取 ({}/{})",
                        current.id, attempt, max_attempts
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn acknowledge(&self, task_id: &str) {
        match self.queue.ack(task_id).await {
            Ok(true) => debug!("任务 {} 的队列认领已确认", task_id),
            Ok(false) => debug!("任务 {} 没有待确认的队列认领", task_id),
            Err(e) => warn!("确认任务 {} 的队列认领失败: {}", task_id, e),
        }
    }

    pub async fn register_worker(&self, registration: WorkerRegistration) -> TaskHubResult<WorkerInfo> {
        if registration.worker_id.trim().is_empty() {
            return Err(TaskHubError::InvalidTaskParams(
                "worker_id不能为空".to_string(),
            ));
        }

        let worker = self.worker_repo.upsert(&registration).await?;
        info!(
            "Worker已注册: {} (平台: {}, CPU: {}, 内存: {}/{})",
            worker.id,
            worker.platform,
            worker.cpu_count,
            worker.memory_available,
            worker.memory_total
        );
        Ok(worker)
    }

    pub async fn record_heartbeat(&self, heartbeat: WorkerHeartbeat) -> TaskHubResult<WorkerInfo> {
        let worker = self
            .worker_repo
            .record_heartbeat(&heartbeat, Utc::now())
            .await?;
        debug!(
            "收到Worker心跳: {} (可用内存: {})",
            worker.id, worker.memory_available
        );
        Ok(worker)
    }

    /// 全部Worker及其存活状态
    pub async fn list_workers(&self) -> TaskHubResult<Vec<WorkerView>> {
        let now = Utc::now();
        let timeout = self.config.worker_timeout_seconds;
        Ok(self
            .worker_repo
            .list()
            .await?
            .into_iter()
            .map(|worker| worker.view(timeout, now))
            .collect())
    }

    /// 为Worker取出下一个任务
    ///
    /// `partitions` 为空时使用默认分区；`timeout` 为零时一直等待。
    /// 重新投递的条目如果对应任务已不再是 `pending`，确认后丢弃并继续等待。
    pub async fn next_task(
        &self,
        partitions: &[String],
        timeout: Duration,
    ) -> TaskHubResult<Option<QueueEntry>> {
        let partitions = if partitions.is_empty() {
            self.default_partitions()
        } else {
            partitions
        };
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);

        loop {
            let remaining = match deadline {
                None => Duration::ZERO,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    remaining
                }
            };

            let Some(entry) = self.queue.pop(partitions, remaining).await? else {
                return Ok(None);
            };

            match self.task_repo.get_by_id(&entry.task_id).await? {
                Some(task) if task.status == TaskStatus::Pending => {
                    debug!("任务 {} 已分发 (分区: {})", entry.task_id, entry.task_type);
                    return Ok(Some(entry));
                }
                Some(task) => {
                    warn!(
                        "丢弃重复投递的任务 {}，当前状态: {}",
                        task.id, task.status
                    );
                    self.acknowledge(&entry.task_id).await;
                }
                None => {
                    warn!("丢弃未知任务的队列条目: {}", entry.task_id);
                    self.acknowledge(&entry.task_id).await;
                }
            }
        }
    }

    pub async fn queue_length(&self, partition: &str) -> TaskHubResult<u64> {
        self.queue.len(partition).await
    }

    /// 默认分区各自的队列长度
    pub async fn queue_lengths(&self) -> TaskHubResult<BTreeMap<String, u64>> {
        let mut lengths = BTreeMap::new();
        for partition in self.default_partitions() {
            lengths.insert(partition.clone(), self.queue.len(partition).await?);
        }
        Ok(lengths)
    }

    /// 将超时未确认的认领放回队列
    pub async fn reclaim_expired(&self) -> TaskHubResult<usize> {
        let requeued = self.queue.requeue_expired(self.visibility_timeout()).await?;
        if requeued > 0 {
            counter!("taskhub_tasks_redelivered_total").increment(requeued as u64);
        }
        Ok(requeued)
    }

    /// 存储与队列的连通性检查
    pub async fn health_check(&self) -> TaskHubResult<()> {
        self.task_repo
            .list(&TaskFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await?;
        self.queue.in_flight().await?;
        Ok(())
    }
}
