use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use taskhub_core::{
    config::models::ExecutionBackoffConfig,
    models::{QueueEntry, TaskStatusUpdate},
    traits::{ExecutionContext, ExecutorRegistry},
    RetryPolicy, TaskHubResult,
};
use tracing::{error, info, warn};

use super::DispatcherGateway;

/// 无法确认开始处理时写入的错误信息
pub const START_FAILED_MESSAGE: &str = "failed to start processing";

/// 一次任务处理的结局
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed { attempts: u32 },
    Failed { attempts: u32 },
    /// `processing` 状态无法写入，执行器未被调用
    StartFailed,
    /// 分发服务拒绝了 `processing`，任务已被其他Worker认领或已结束
    Rejected,
    Unsupported,
}

/// Worker的任务执行状态机
///
/// `pending → processing` 写入成功后才会调用执行器；执行失败按任务的重试预算
/// 重试，只有最后一次失败会写入任务记录。
pub struct TaskExecutionManager {
    worker_id: String,
    gateway: Arc<dyn DispatcherGateway>,
    executors: ExecutorRegistry,
    status_policy: RetryPolicy,
    backoff: ExecutionBackoffConfig,
}

impl TaskExecutionManager {
    pub fn new(
        worker_id: String,
        gateway: Arc<dyn DispatcherGateway>,
        executors: ExecutorRegistry,
        status_policy: RetryPolicy,
        backoff: ExecutionBackoffConfig,
    ) -> Self {
        Self {
            worker_id,
            gateway,
            executors,
            status_policy,
            backoff,
        }
    }

    pub fn supported_task_types(&self) -> Vec<String> {
        self.executors.task_types()
    }

    /// 处理一个拉取到的任务直到结束
    pub async fn handle(&self, entry: QueueEntry) -> ExecutionOutcome {
        let queue_wait = (Utc::now() - entry.enqueued_at).num_milliseconds() as f64 / 1000.0;
        info!(
            "收到任务 {} (类型: {})，排队 {:.2}s",
            entry.task_id, entry.task_type, queue_wait
        );

        let Some(executor) = self.executors.get(&entry.task_type) else {
            error!("任务类型 '{}' 没有对应的执行器", entry.task_type);
            let update = TaskStatusUpdate::failed(
                &entry.task_id,
                format!("unsupported task type: {}", entry.task_type),
                None,
                None,
            )
            .by_worker(&self.worker_id);
            self.report_final(&update).await;
            return ExecutionOutcome::Unsupported;
        };

        let started_at = Instant::now();
        let processing = TaskStatusUpdate::processing(&entry.task_id).by_worker(&self.worker_id);
        if let Err(e) = self.report("上报processing", &processing).await {
            if e.is_retryable() {
                error!("任务 {} 无法开始处理: {}", entry.task_id, e);
                let update =
                    TaskStatusUpdate::failed(&entry.task_id, START_FAILED_MESSAGE, None, None)
                        .by_worker(&self.worker_id);
                self.report_final(&update).await;
                return ExecutionOutcome::StartFailed;
            }
            warn!("任务 {} 的processing状态被拒绝，跳过: {}", entry.task_id, e);
            return ExecutionOutcome::Rejected;
        }

        let budget = entry.retry_budget.max(1) as u32;
        let policy = self.backoff.policy(budget);
        let mut last_error = None;

        for attempt in 1..=budget {
            let context = ExecutionContext {
                task_id: entry.task_id.clone(),
                task_type: entry.task_type.clone(),
                payload: entry.payload.clone(),
                worker_id: self.worker_id.clone(),
                attempt,
                started_at,
            };

            match executor.execute(&context).await {
                Ok(result) => {
                    let duration = started_at.elapsed().as_secs_f64();
                    info!(
                        "任务 {} 执行成功，第 {}/{} 次尝试，耗时 {:.3}s",
                        entry.task_id, attempt, budget, duration
                    );
                    let update = TaskStatusUpdate::completed(
                        &entry.task_id,
                        result,
                        duration,
                        (budget - attempt) as i32,
                    )
                    .by_worker(&self.worker_id);
                    self.report_final(&update).await;
                    return ExecutionOutcome::Completed { attempts: attempt };
                }
                Err(e) => {
                    warn!(
                        "任务 {} 第 {}/{} 次执行失败: {}",
                        entry.task_id, attempt, budget, e
                    );
                    last_error = Some(e);
                    if attempt < budget {
                        tokio::time::sleep(policy.delay_for(attempt)).await;
                    }
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "execution failed".to_string());
        let duration = started_at.elapsed().as_secs_f64();
        error!(
            "任务 {} 在 {} 次尝试后失败: {}",
            entry.task_id, budget, message
        );
        let update = TaskStatusUpdate::failed(&entry.task_id, message, Some(duration), Some(0))
            .by_worker(&self.worker_id);
        self.report_final(&update).await;
        ExecutionOutcome::Failed { attempts: budget }
    }

    async fn report(&self, operation: &str, update: &TaskStatusUpdate) -> TaskHubResult<()> {
        self.status_policy
            .retry(operation, |_| self.gateway.update_task(update))
            .await
    }

    async fn report_final(&self, update: &TaskStatusUpdate) {
        if let Err(e) = self.report("上报最终状态", update).await {
            error!(
                "任务 {} 的最终状态 {:?} 上报失败: {}",
                update.task_id, update.status, e
            );
        }
    }
}

impl std::fmt::Debug for TaskExecutionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutionManager")
            .field("worker_id", &self.worker_id)
            .field("executors", &self.executors)
            .finish()
    }
}
