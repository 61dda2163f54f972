use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Task;

/// 队列中的任务条目
///
/// 是任务在提交时刻的快照，队列按 `task_type` 分区。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub task_id: String,
    pub task_type: String,
    pub payload: Value,
    pub retry_budget: i32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            payload: task.payload.clone(),
            retry_budget: task.retry_budget,
            enqueued_at: Utc::now(),
        }
    }
}
