use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskhub_core::models::{QueueEntry, Task, WorkerView};

/// 错误响应信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
            timestamp: Utc::now(),
        }
    }
}

/// 写操作的确认
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
}

impl Ack {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskResponse {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksResponse {
    pub total: usize,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersResponse {
    pub workers: Vec<WorkerView>,
}

/// 拉取结果，队列为空时 `task` 为 null
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextTaskResponse {
    pub task: Option<QueueEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueueLengthResponse {
    Single { length: u64 },
    All { lengths: std::collections::BTreeMap<String, u64> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_serialization() {
        let json = serde_json::to_value(ErrorBody::new("TASK_NOT_FOUND", "任务不存在")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "TASK_NOT_FOUND");
        assert_eq!(json["error"]["message"], "任务不存在");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_empty_next_task_serializes_null() {
        let json = serde_json::to_string(&NextTaskResponse { task: None }).unwrap();
        assert_eq!(json, r#"{"task":null}"#);
    }

    #[test]
    fn test_queue_length_shapes() {
        let single = serde_json::to_value(QueueLengthResponse::Single { length: 3 }).unwrap();
        assert_eq!(single, serde_json::json!({"length": 3}));

        let mut lengths = std::collections::BTreeMap::new();
        lengths.insert("test".to_string(), 1);
        let all = serde_json::to_value(QueueLengthResponse::All { lengths }).unwrap();
        assert_eq!(all, serde_json::json!({"lengths": {"test": 1}}));
    }
}
