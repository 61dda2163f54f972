#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use taskhub_core::{
    models::{QueueEntry, TaskStatus, TaskStatusUpdate, WorkerHeartbeat, WorkerRegistration},
    traits::{ExecutionContext, TaskExecutor},
    TaskHubError, TaskHubResult,
};
use taskhub_worker::DispatcherGateway;

/// 可注入故障的分发服务替身
#[derive(Default)]
pub struct FakeGateway {
    pub registrations: Mutex<Vec<WorkerRegistration>>,
    pub register_failures: AtomicU32,
    /// 成功的心跳
    pub heartbeats: Mutex<Vec<WorkerHeartbeat>>,
    pub heartbeat_attempts: AtomicU32,
    /// 前N次心跳返回网络错误
    pub heartbeat_failures: AtomicU32,
    /// 前N次心跳返回404
    pub heartbeat_unknown: AtomicU32,
    pub entries: Mutex<VecDeque<TaskHubResult<Option<QueueEntry>>>>,
    pub poll_count: AtomicU32,
    /// 所有写入请求（包括失败的）
    pub update_attempts: Mutex<Vec<TaskStatusUpdate>>,
    /// 成功写入的请求
    pub updates: Mutex<Vec<TaskStatusUpdate>>,
    /// 写入该状态时返回的错误
    pub update_failure: Mutex<Option<(TaskStatus, UpdateFailure)>>,
}

#[derive(Clone, Copy)]
pub enum UpdateFailure {
    /// 每次都返回网络错误
    Unreachable,
    /// 前N次返回网络错误
    Transient(u32),
    /// 返回409
    Conflict,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_updates(&self, status: TaskStatus, failure: UpdateFailure) {
        *self.update_failure.lock().unwrap() = Some((status, failure));
    }

    pub fn push_entry(&self, entry: QueueEntry) {
        self.entries.lock().unwrap().push_back(Ok(Some(entry)));
    }

    pub fn push_poll_error(&self) {
        self.entries
            .lock()
            .unwrap()
            .push_back(Err(TaskHubError::Network("connection reset".to_string())));
    }

    pub fn updates(&self) -> Vec<TaskStatusUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn update_attempts_for(&self, status: TaskStatus) -> usize {
        self.update_attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.status == Some(status))
            .count()
    }

    pub fn final_update(&self, task_id: &str) -> Option<TaskStatusUpdate> {
        self.updates()
            .into_iter()
            .filter(|u| u.task_id == task_id)
            .find(|u| u.status.is_some_and(|s| s.is_terminal()))
    }
}

#[async_trait]
impl DispatcherGateway for FakeGateway {
    async fn register(&self, registration: &WorkerRegistration) -> TaskHubResult<()> {
        self.registrations.lock().unwrap().push(registration.clone());
        let remaining = self.register_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.register_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TaskHubError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    async fn heartbeat(&self, heartbeat: &WorkerHeartbeat) -> TaskHubResult<()> {
        self.heartbeat_attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.heartbeat_failures) {
            return Err(TaskHubError::Network("connection reset".to_string()));
        }
        if take_one(&self.heartbeat_unknown) {
            return Err(TaskHubError::Http {
                status: 404,
                body: "worker not found".into(),
            });
        }
        self.heartbeats.lock().unwrap().push(heartbeat.clone());
        Ok(())
    }

    async fn next_task(
        &self,
        _task_types: &[String],
        _wait: Duration,
    ) -> TaskHubResult<Option<QueueEntry>> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        let next = self.entries.lock().unwrap().pop_front();
        next.unwrap_or(Ok(None))
    }

    async fn update_task(&self, update: &TaskStatusUpdate) -> TaskHubResult<()> {
        self.update_attempts.lock().unwrap().push(update.clone());

        let failure = {
            let mut guard = self.update_failure.lock().unwrap();
            match guard.as_mut() {
                Some((status, failure)) if update.status == Some(*status) => match failure {
                    UpdateFailure::Unreachable => Some(TaskHubError::Network("unreachable".into())),
                    UpdateFailure::Conflict => Some(TaskHubError::Http {
                        status: 409,
                        body: "terminal".into(),
                    }),
                    UpdateFailure::Transient(n) if *n > 0 => {
                        *n -= 1;
                        Some(TaskHubError::Http {
                            status: 503,
                            body: "busy".into(),
                        })
                    }
                    UpdateFailure::Transient(_) => None,
                },
                _ => None,
            }
        };

        if let Some(err) = failure {
            return Err(err);
        }
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

/// 计数大于0时减一并返回 `true`
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// 前 `failures` 次失败，之后成功的执行器
pub struct FlakyExecutor {
    pub task_type: String,
    pub failures: u32,
    pub attempts: AtomicU32,
}

impl FlakyExecutor {
    pub fn new(task_type: &str, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            task_type: task_type.to_string(),
            failures,
            attempts: AtomicU32::new(0),
        })
    }

    pub fn always_failing(task_type: &str) -> Arc<Self> {
        Self::new(task_type, u32::MAX)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for FlakyExecutor {
    fn task_type(&self) -> &str {
        &self.task_type
    }

    async fn execute(&self, context: &ExecutionContext) -> TaskHubResult<Value> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        assert_eq!(attempt, context.attempt);
        if attempt <= self.failures {
            return Err(TaskHubError::TaskExecution("boom".to_string()));
        }
        Ok(json!({"output": "processed", "attempt": attempt}))
    }
}

pub fn entry(task_id: &str, task_type: &str, retry_budget: i32) -> QueueEntry {
    QueueEntry {
        task_id: task_id.to_string(),
        task_type: task_type.to_string(),
        payload: json!({"n": 1}),
        retry_budget,
        enqueued_at: Utc::now(),
    }
}
