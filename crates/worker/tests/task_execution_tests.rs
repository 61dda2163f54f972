mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{entry, FakeGateway, FlakyExecutor, UpdateFailure};
use taskhub_core::{
    config::models::ExecutionBackoffConfig, models::TaskStatus, traits::ExecutorRegistry,
    RetryPolicy,
};
use taskhub_worker::{
    DispatcherGateway, EchoExecutor, ExecutionOutcome, TaskExecutionManager, START_FAILED_MESSAGE,
};

fn fast_backoff() -> ExecutionBackoffConfig {
    ExecutionBackoffConfig {
        base_delay_ms: 1,
        ..Default::default()
    }
}

fn manager(gateway: &Arc<FakeGateway>, registry: ExecutorRegistry) -> TaskExecutionManager {
    TaskExecutionManager::new(
        "worker-1".to_string(),
        gateway.clone() as Arc<dyn DispatcherGateway>,
        registry,
        RetryPolicy::fixed(3, Duration::from_millis(1)),
        fast_backoff(),
    )
}

fn registry_with(executor: Arc<FlakyExecutor>) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register(executor);
    registry
}

#[tokio::test]
async fn test_successful_task_reports_processing_then_completed() {
    let gateway = FakeGateway::new();
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(EchoExecutor));
    let manager = manager(&gateway, registry);

    let outcome = manager.handle(entry("t-1", "test", 3)).await;
    assert_eq!(outcome, ExecutionOutcome::Completed { attempts: 1 });

    let updates = gateway.updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].status, Some(TaskStatus::Processing));
    assert!(updates[0].result.is_none());

    let done = &updates[1];
    assert_eq!(done.status, Some(TaskStatus::Completed));
    assert_eq!(done.result.as_ref().unwrap()["output"], "processed");
    assert!(done.duration.unwrap() > 0.0);
    assert!(done.error_message.is_none());
    assert_eq!(done.retry_budget, Some(2));
    assert!(updates
        .iter()
        .all(|u| u.worker_id.as_deref() == Some("worker-1")));
}

#[tokio::test]
async fn test_always_failing_task_uses_whole_budget() {
    let gateway = FakeGateway::new();
    let executor = FlakyExecutor::always_failing("boom");
    let manager = manager(&gateway, registry_with(executor.clone()));

    let outcome = manager.handle(entry("t-2", "boom", 2)).await;
    assert_eq!(outcome, ExecutionOutcome::Failed { attempts: 2 });
    assert_eq!(executor.attempts(), 2);

    let failed = gateway.final_update("t-2").unwrap();
    assert_eq!(failed.status, Some(TaskStatus::Failed));
    assert_eq!(failed.error_message.as_deref(), Some("boom"));
    assert!(failed.result.is_none());
    assert!(failed.duration.is_some());
    assert_eq!(failed.retry_budget, Some(0));

    // 中间失败不写入任务记录
    assert_eq!(gateway.updates().len(), 2);
}

#[tokio::test]
async fn test_success_on_later_attempt_counts_attempts() {
    let gateway = FakeGateway::new();
    let executor = FlakyExecutor::new("flaky", 2);
    let manager = manager(&gateway, registry_with(executor.clone()));

    let outcome = manager.handle(entry("t-3", "flaky", 3)).await;
    assert_eq!(outcome, ExecutionOutcome::Completed { attempts: 3 });
    assert_eq!(executor.attempts(), 3);

    let done = gateway.final_update("t-3").unwrap();
    assert_eq!(done.status, Some(TaskStatus::Completed));
    assert_eq!(done.retry_budget, Some(0));
}

#[tokio::test]
async fn test_unreachable_processing_write_fails_fast() {
    let gateway = FakeGateway::new();
    gateway.fail_updates(TaskStatus::Processing, UpdateFailure::Unreachable);
    let executor = FlakyExecutor::new("test", 0);
    let manager = manager(&gateway, registry_with(executor.clone()));

    let outcome = manager.handle(entry("t-4", "test", 3)).await;
    assert_eq!(outcome, ExecutionOutcome::StartFailed);
    assert_eq!(executor.attempts(), 0);
    assert_eq!(gateway.update_attempts_for(TaskStatus::Processing), 3);

    let failed = gateway.final_update("t-4").unwrap();
    assert_eq!(failed.status, Some(TaskStatus::Failed));
    assert_eq!(failed.error_message.as_deref(), Some(START_FAILED_MESSAGE));
    assert!(failed.duration.is_none());
    assert_eq!(failed.worker_id.as_deref(), Some("worker-1"));
}

#[tokio::test]
async fn test_transient_processing_failure_is_retried() {
    let gateway = FakeGateway::new();
    gateway.fail_updates(TaskStatus::Processing, UpdateFailure::Transient(2));
    let executor = FlakyExecutor::new("test", 0);
    let manager = manager(&gateway, registry_with(executor.clone()));

    let outcome = manager.handle(entry("t-5", "test", 3)).await;
    assert_eq!(outcome, ExecutionOutcome::Completed { attempts: 1 });
    assert_eq!(gateway.update_attempts_for(TaskStatus::Processing), 3);
    assert_eq!(executor.attempts(), 1);
}

#[tokio::test]
async fn test_rejected_processing_write_skips_task() {
    let gateway = FakeGateway::new();
    gateway.fail_updates(TaskStatus::Processing, UpdateFailure::Conflict);
    let executor = FlakyExecutor::new("test", 0);
    let manager = manager(&gateway, registry_with(executor.clone()));

    let outcome = manager.handle(entry("t-6", "test", 3)).await;
    assert_eq!(outcome, ExecutionOutcome::Rejected);
    assert_eq!(executor.attempts(), 0);
    assert_eq!(gateway.update_attempts_for(TaskStatus::Processing), 1);
    assert!(gateway.final_update("t-6").is_none());
}

#[tokio::test]
async fn test_unsupported_task_type_is_failed() {
    let gateway = FakeGateway::new();
    let manager = manager(&gateway, ExecutorRegistry::new());

    let outcome = manager.handle(entry("t-7", "tts", 3)).await;
    assert_eq!(outcome, ExecutionOutcome::Unsupported);

    let failed = gateway.final_update("t-7").unwrap();
    assert_eq!(
        failed.error_message.as_deref(),
        Some("unsupported task type: tts")
    );
}

#[tokio::test]
async fn test_final_report_failure_does_not_panic() {
    let gateway = FakeGateway::new();
    gateway.fail_updates(TaskStatus::Completed, UpdateFailure::Unreachable);
    let executor = FlakyExecutor::new("test", 0);
    let manager = manager(&gateway, registry_with(executor.clone()));

    let outcome = manager.handle(entry("t-8", "test", 1)).await;
    assert_eq!(outcome, ExecutionOutcome::Completed { attempts: 1 });
    assert_eq!(gateway.update_attempts_for(TaskStatus::Completed), 3);
}
