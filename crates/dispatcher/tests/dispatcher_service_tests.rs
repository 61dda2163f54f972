use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use taskhub_core::config::models::{DispatcherConfig, QueueConfig};
use taskhub_core::models::{
    NewTask, QueueEntry, Task, TaskFilter, TaskPatch, TaskStatus, TaskStatusUpdate,
    WorkerHeartbeat, WorkerRegistration,
};
use taskhub_core::traits::{TaskQueue, TaskRepository, WorkerRepository};
use taskhub_core::{TaskHubError, TaskHubResult};
use taskhub_dispatcher::{ClaimReaper, DispatcherService, ENQUEUE_FAILED_MESSAGE};
use taskhub_infrastructure::{
    run_migrations, InMemoryTaskQueue, SqliteTaskRepository, SqliteWorkerRepository,
};
use tokio::sync::broadcast;

struct Harness {
    service: DispatcherService,
    task_repo: Arc<dyn TaskRepository>,
    queue: Arc<dyn TaskQueue>,
}

async fn repositories() -> (Arc<dyn TaskRepository>, Arc<dyn WorkerRepository>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    (
        Arc::new(SqliteTaskRepository::new(pool.clone())),
        Arc::new(SqliteWorkerRepository::new(pool)),
    )
}

async fn harness_with(
    queue: Arc<dyn TaskQueue>,
    wrap_repo: impl FnOnce(Arc<dyn TaskRepository>) -> Arc<dyn TaskRepository>,
) -> Harness {
    let (task_repo, worker_repo) = repositories().await;
    let task_repo = wrap_repo(task_repo);
    let service = DispatcherService::new(
        task_repo.clone(),
        worker_repo,
        queue.clone(),
        DispatcherConfig::default(),
        QueueConfig::default(),
    );
    Harness {
        service,
        task_repo,
        queue,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(InMemoryTaskQueue::new()), |repo| repo).await
}

fn new_task(task_type: &str, retry_budget: Option<i32>) -> NewTask {
    NewTask {
        task_type: task_type.to_string(),
        payload: json!({"n": 1}),
        retry_budget,
    }
}

fn short() -> Duration {
    Duration::from_millis(20)
}

#[tokio::test]
async fn test_submit_creates_pending_task_and_enqueues() {
    let h = harness().await;
    let task = h.service.submit_task(new_task("test", Some(3))).await.unwrap();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.retry_budget, 3);
    assert_eq!(h.service.queue_length("test").await.unwrap(), 1);

    let stored = h.service.get_task(&task.id).await.unwrap();
    assert_eq!(stored.payload, json!({"n": 1}));
}

#[tokio::test]
async fn test_submit_uses_default_budget_and_rejects_invalid() {
    let h = harness().await;
    let task = h.service.submit_task(new_task("test", None)).await.unwrap();
    assert_eq!(task.retry_budget, 3);

    let err = h.service.submit_task(new_task("", None)).await.unwrap_err();
    assert!(matches!(err, TaskHubError::InvalidTaskParams(_)));

    let err = h
        .service
        .submit_task(new_task("test", Some(-1)))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskHubError::InvalidTaskParams(_)));
}

#[tokio::test]
async fn test_get_unknown_task_is_not_found() {
    let h = harness().await;
    let err = h.service.get_task("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_next_task_is_fifo_and_acked_on_processing() {
    let h = harness().await;
    let a = h.service.submit_task(new_task("test", None)).await.unwrap();
    let b = h.service.submit_task(new_task("test", None)).await.unwrap();

    let partitions = vec!["test".to_string()];
    let first = h.service.next_task(&partitions, short()).await.unwrap().unwrap();
    assert_eq!(first.task_id, a.id);
    assert_eq!(first.retry_budget, 3);
    assert_eq!(h.queue.in_flight().await.unwrap(), 1);

    h.service
        .update_task_status(TaskStatusUpdate::processing(&a.id))
        .await
        .unwrap();
    assert_eq!(h.queue.in_flight().await.unwrap(), 0);

    let second = h.service.next_task(&partitions, short()).await.unwrap().unwrap();
    assert_eq!(second.task_id, b.id);
}

#[tokio::test]
async fn test_next_task_defaults_to_configured_partitions() {
    let h = harness().await;
    let whisper = h.service.submit_task(new_task("whisper", None)).await.unwrap();

    let entry = h.service.next_task(&[], short()).await.unwrap().unwrap();
    assert_eq!(entry.task_id, whisper.id);

    assert!(h.service.next_task(&[], short()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_full_lifecycle_to_completed() {
    let h = harness().await;
    let task = h.service.submit_task(new_task("test", Some(3))).await.unwrap();
    h.service
        .next_task(&["test".to_string()], short())
        .await
        .unwrap()
        .unwrap();

    h.service
        .update_task_status(TaskStatusUpdate::processing(&task.id))
        .await
        .unwrap();
    let done = h
        .service
        .update_task_status(TaskStatusUpdate::completed(
            &task.id,
            json!({"output": "processed"}),
            0.5,
            2,
        ))
        .await
        .unwrap();

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result, Some(json!({"output": "processed"})));
    assert!(done.error_message.is_none());
    assert_eq!(done.duration, Some(0.5));
    assert_eq!(done.retry_budget, 2);
}

#[tokio::test]
async fn test_terminal_task_rejects_late_updates() {
    let h = harness().await;
    let task = h.service.submit_task(new_task("test", None)).await.unwrap();
    h.service
        .update_task_status(TaskStatusUpdate::processing(&task.id))
        .await
        .unwrap();
    h.service
        .update_task_status(TaskStatusUpdate::failed(&task.id, "boom", Some(1.0), Some(0)))
        .await
        .unwrap();

    for late in [
        TaskStatusUpdate::processing(&task.id),
        TaskStatusUpdate::completed(&task.id, json!({}), 1.0, 0),
        TaskStatusUpdate::failed(&task.id, "again", Some(1.0), Some(0)),
    ] {
        let err = h.service.update_task_status(late).await.unwrap_err();
        assert!(matches!(err, TaskHubError::TerminalTask { .. }));
    }

    let stored = h.service.get_task(&task.id).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("boom"));
    assert!(stored.result.is_none());
}

#[tokio::test]
async fn test_illegal_and_inconsistent_updates_are_rejected() {
    let h = harness().await;
    let task = h.service.submit_task(new_task("test", None)).await.unwrap();

    let err = h
        .service
        .update_task_status(TaskStatusUpdate::completed(&task.id, json!({}), 1.0, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskHubError::InvalidTransition { .. }));

    let err = h
        .service
        .update_task_status(TaskStatusUpdate {
            task_id: task.id.clone(),
            status: Some(TaskStatus::Processing),
            retry_budget: Some(5),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TaskHubError::InconsistentUpdate(_)));

    let err = h
        .service
        .update_task_status(TaskStatusUpdate::processing("missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_fail_fast_from_pending_acks_claim() {
    let h = harness().await;
    let task = h.service.submit_task(new_task("test", None)).await.unwrap();
    h.service
        .next_task(&["test".to_string()], short())
        .await
        .unwrap()
        .unwrap();

    let failed = h
        .service
        .update_task_status(TaskStatusUpdate::failed(
            &task.id,
            "failed to start processing",
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(h.queue.in_flight().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unacknowledged_claim_is_redelivered() {
    let h = harness().await;
    let task = h.service.submit_task(new_task("test", None)).await.unwrap();
    let partitions = vec!["test".to_string()];

    h.service
        .next_task(&partitions, short())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.service.reclaim_expired().await.unwrap(), 0);
    assert!(h.service.next_task(&partitions, short()).await.unwrap().is_none());

    // 模拟Worker在确认前崩溃：认领过期后重新投递
    assert_eq!(h.queue.requeue_expired(Duration::ZERO).await.unwrap(), 1);
    let redelivered = h
        .service
        .next_task(&partitions, short())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(redelivered.task_id, task.id);
}

#[tokio::test]
async fn test_stale_claimant_cannot_override_redelivered_task() {
    let h = harness().await;
    let task = h.service.submit_task(new_task("test", None)).await.unwrap();
    let partitions = vec!["test".to_string()];

    let first = h
        .service
        .next_task(&partitions, short())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.task_id, task.id);

    // worker-a 的认领在确认前过期，任务重新投递给 worker-b
    assert_eq!(h.queue.requeue_expired(Duration::ZERO).await.unwrap(), 1);
    let second = h
        .service
        .next_task(&partitions, short())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.task_id, task.id);

    let processing = h
        .service
        .update_task_status(TaskStatusUpdate::processing(&task.id).by_worker("worker-b"))
        .await
        .unwrap();
    assert_eq!(processing.status, TaskStatus::Processing);
    assert_eq!(processing.worker_id.as_deref(), Some("worker-b"));

    let err = h
        .service
        .update_task_status(TaskStatusUpdate::processing(&task.id).by_worker("worker-a"))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskHubError::ClaimMismatch { ref owner, .. } if owner == "worker-b"));

    let err = h
        .service
        .update_task_status(
            TaskStatusUpdate::failed(&task.id, "failed to start processing", None, None)
                .by_worker("worker-a"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TaskHubError::ClaimMismatch { .. }));
    assert_eq!(
        h.service.get_task(&task.id).await.unwrap().status,
        TaskStatus::Processing
    );

    let completed = h
        .service
        .update_task_status(
            TaskStatusUpdate::completed(&task.id, json!({"output": "processed"}), 0.5, 3)
                .by_worker("worker-b"),
        )
        .await
        .unwrap();
    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.worker_id.as_deref(), Some("worker-b"));
    assert!(completed.error_message.is_none());
}

#[tokio::test]
async fn test_claim_reaper_requeues_expired_claims_until_shutdown() {
    let (task_repo, worker_repo) = repositories().await;
    let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryTaskQueue::new());
    let service = Arc::new(DispatcherService::new(
        task_repo,
        worker_repo,
        queue.clone(),
        DispatcherConfig::default(),
        QueueConfig {
            visibility_timeout_seconds: 0,
            ..Default::default()
        },
    ));

    let task = service.submit_task(new_task("test", None)).await.unwrap();
    let partitions = vec!["test".to_string()];
    service
        .next_task(&partitions, short())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(service.queue_length("test").await.unwrap(), 0);
    assert_eq!(queue.in_flight().await.unwrap(), 1);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let reaper = tokio::spawn(
        ClaimReaper::new(Arc::clone(&service), Duration::from_millis(10)).run(shutdown_rx),
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        while service.queue_length("test").await.unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("expired claim was not requeued");
    assert_eq!(queue.in_flight().await.unwrap(), 0);

    let redelivered = service
        .next_task(&partitions, short())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(redelivered.task_id, task.id);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), reaper)
        .await
        .expect("reaper did not stop on shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_stale_redelivery_of_started_task_is_dropped() {
    let h = harness().await;
    let task = h.service.submit_task(new_task("test", None)).await.unwrap();
    let partitions = vec!["test".to_string()];
    h.service
        .next_task(&partitions, short())
        .await
        .unwrap()
        .unwrap();

    // 状态已写入但队列确认丢失
    h.task_repo
        .update(
            &task.id,
            &TaskPatch {
                status: Some(TaskStatus::Processing),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.queue.requeue_expired(Duration::ZERO).await.unwrap();

    assert!(h.service.next_task(&partitions, short()).await.unwrap().is_none());
    assert_eq!(h.queue.in_flight().await.unwrap(), 0);
    assert_eq!(h.service.queue_length("test").await.unwrap(), 0);
}

#[tokio::test]
async fn test_queue_lengths_cover_default_partitions() {
    let h = harness().await;
    h.service.submit_task(new_task("test", None)).await.unwrap();
    h.service.submit_task(new_task("test", None)).await.unwrap();
    h.service.submit_task(new_task("whisper", None)).await.unwrap();

    let lengths = h.service.queue_lengths().await.unwrap();
    assert_eq!(lengths.get("test"), Some(&2));
    assert_eq!(lengths.get("whisper"), Some(&1));
    assert_eq!(h.service.queue_length("other").await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_tasks_by_status() {
    let h = harness().await;
    let a = h.service.submit_task(new_task("test", None)).await.unwrap();
    h.service.submit_task(new_task("test", None)).await.unwrap();
    h.service
        .update_task_status(TaskStatusUpdate::processing(&a.id))
        .await
        .unwrap();

    let processing = h
        .service
        .list_tasks(&TaskFilter {
            status: Some(TaskStatus::Processing),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(processing.len(), 1);
    assert_eq!(processing[0].id, a.id);
}

#[tokio::test]
async fn test_worker_registration_heartbeat_and_liveness() {
    let h = harness().await;
    let registration = WorkerRegistration {
        worker_id: "worker-1".to_string(),
        platform: "Linux".to_string(),
        memory_total: 1000,
        memory_available: 900,
        cpu_count: 4,
        cpu_freq: 2000.0,
        gpu_info: None,
    };
    h.service.register_worker(registration.clone()).await.unwrap();

    let beat = h
        .service
        .record_heartbeat(WorkerHeartbeat {
            worker_id: "worker-1".to_string(),
            memory_available: 500,
        })
        .await
        .unwrap();
    assert_eq!(beat.memory_available, 500);
    assert_eq!(beat.platform, "Linux");
    assert_eq!(beat.cpu_count, 4);
    assert_eq!(beat.memory_total, 1000);

    let workers = h.service.list_workers().await.unwrap();
    assert_eq!(workers.len(), 1);
    assert!(workers[0].alive);

    let err = h
        .service
        .record_heartbeat(WorkerHeartbeat {
            worker_id: "ghost".to_string(),
            memory_available: 1,
        })
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let mut empty = registration;
    empty.worker_id = " ".to_string();
    assert!(h.service.register_worker(empty).await.is_err());
}

/// 推入总是失败的队列
struct BrokenQueue;

#[async_trait]
impl TaskQueue for BrokenQueue {
    async fn push(&self, _partition: &str, _entry: &QueueEntry) -> TaskHubResult<()> {
        Err(TaskHubError::Queue("connection refused".to_string()))
    }
    async fn pop(&self, _p: &[String], _t: Duration) -> TaskHubResult<Option<QueueEntry>> {
        Ok(None)
    }
    async fn ack(&self, _task_id: &str) -> TaskHubResult<bool> {
        Ok(false)
    }
    async fn requeue_expired(&self, _v: Duration) -> TaskHubResult<usize> {
        Ok(0)
    }
    async fn len(&self, _partition: &str) -> TaskHubResult<u64> {
        Ok(0)
    }
    async fn in_flight(&self) -> TaskHubResult<u64> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_enqueue_failure_surfaces_error_and_marks_task_failed() {
    let h = harness_with(Arc::new(BrokenQueue), |repo| repo).await;

    let err = h
        .service
        .submit_task(new_task("test", None))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskHubError::Queue(_)));

    let tasks = h.service.list_tasks(&TaskFilter::default()).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert_eq!(tasks[0].error_message.as_deref(), Some(ENQUEUE_FAILED_MESSAGE));
}

/// 前若干次条件写入返回版本冲突的仓储
struct ConflictingRepo {
    inner: Arc<dyn TaskRepository>,
    conflicts_left: AtomicU32,
    updates: AtomicU32,
}

#[async_trait]
impl TaskRepository for ConflictingRepo {
    async fn create(&self, task: &Task) -> TaskHubResult<Task> {
        self.inner.create(task).await
    }
    async fn get_by_id(&self, id: &str) -> TaskHubResult<Option<Task>> {
        self.inner.get_by_id(id).await
    }
    async fn list(&self, filter: &TaskFilter) -> TaskHubResult<Vec<Task>> {
        self.inner.list(filter).await
    }
    async fn update(&self, id: &str, patch: &TaskPatch) -> TaskHubResult<Task> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let left = self.conflicts_left.load(Ordering::SeqCst);
        if left > 0 {
            self.conflicts_left.store(left - 1, Ordering::SeqCst);
            return Err(TaskHubError::VersionConflict {
                id: id.to_string(),
                expected: patch.expected_version.unwrap_or_default(),
            });
        }
        self.inner.update(id, patch).await
    }
}

#[tokio::test]
async fn test_version_conflicts_are_retried_then_surfaced() {
    let conflicting = Arc::new(std::sync::Mutex::new(None::<Arc<ConflictingRepo>>));
    let slot = conflicting.clone();
    let h = harness_with(Arc::new(InMemoryTaskQueue::new()), move |inner| {
        let repo = Arc::new(ConflictingRepo {
            inner,
            conflicts_left: AtomicU32::new(0),
            updates: AtomicU32::new(0),
        });
        *slot.lock().unwrap() = Some(repo.clone());
        repo
    })
    .await;
    let repo = conflicting.lock().unwrap().clone().unwrap();

    let task = h.service.submit_task(new_task("test", None)).await.unwrap();

    repo.conflicts_left.store(2, Ordering::SeqCst);
    let updated = h
        .service
        .update_task_status(TaskStatusUpdate::processing(&task.id))
        .await
        .unwrap();
    assert_eq!(updated.status, TaskStatus::Processing);
    assert_eq!(repo.updates.load(Ordering::SeqCst), 3);

    repo.conflicts_left.store(3, Ordering::SeqCst);
    let err = h
        .service
        .update_task_status(TaskStatusUpdate::failed(&task.id, "boom", Some(1.0), Some(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskHubError::VersionConflict { .. }));
}
