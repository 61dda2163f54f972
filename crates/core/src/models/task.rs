use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{TaskHubError, TaskHubResult};

/// 默认的执行重试预算
pub const DEFAULT_RETRY_BUDGET: i32 = 3;

/// 任务记录
///
/// 由Dispatcher创建（状态为 `pending`），之后只有取得该任务的Worker
/// 会写入状态、结果、错误信息和耗时。
///
/// # 字段说明
///
/// - `id`: 提交时生成的UUID，不可变
/// - `task_type`: 任务类型，同时决定队列分区
/// - `payload`: 调用方提供的任意JSON，原样传给执行器
/// - `retry_budget`: 剩余可执行次数，只由Worker递减，永不为负
/// - `result` / `error_message`: 终止状态下二者恰有其一
/// - `duration`: 终止转换时写入的处理耗时（秒）
/// - `worker_id`: `pending → processing` 时记录的认领Worker，之后只接受它的写入
/// - `version`: 乐观并发控制版本号，每次写入递增
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub payload: Value,
    pub status: TaskStatus,
    pub retry_budget: i32,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub duration: Option<f64>,
    #[serde(default)]
    pub worker_id: Option<String>,
    pub version: i64,
}

/// 任务状态
///
/// ```text
/// pending → processing → completed
///    │           │
///    └───────────┴──────→ failed
/// ```
///
/// `pending → failed` 只用于Worker无法确认开始处理时的快速失败。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// 检查状态转换是否合法
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskHubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(TaskHubError::InvalidTaskParams(format!(
                "无效的任务状态: {s}"
            ))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<TaskStatus>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务提交请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub task_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub retry_budget: Option<i32>,
}

/// Worker上报的状态写入
///
/// 只有出现的字段会被写入，字段集合是固定的。`worker_id` 标识写入方，
/// 任务被认领后只接受认领者的写入。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusUpdate {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_budget: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

impl TaskStatusUpdate {
    pub fn processing(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: Some(TaskStatus::Processing),
            ..Default::default()
        }
    }

    pub fn completed(
        task_id: impl Into<String>,
        result: Value,
        duration: f64,
        retry_budget: i32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status: Some(TaskStatus::Completed),
            result: Some(result),
            duration: Some(duration),
            retry_budget: Some(retry_budget),
            ..Default::default()
        }
    }

    pub fn failed(
        task_id: impl Into<String>,
        error_message: impl Into<String>,
        duration: Option<f64>,
        retry_budget: Option<i32>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            status: Some(TaskStatus::Failed),
            error_message: Some(error_message.into()),
            duration,
            retry_budget,
            ..Default::default()
        }
    }

    /// 标记写入方
    pub fn by_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }
}

/// 仓储层的部分更新
///
/// `expected_version` 存在时为条件写入，版本不匹配返回 `VersionConflict`。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub duration: Option<f64>,
    pub retry_budget: Option<i32>,
    /// 只在 `pending → processing` 时写入
    pub worker_id: Option<String>,
    pub expected_version: Option<i64>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.result.is_none()
            && self.error_message.is_none()
            && self.duration.is_none()
            && self.retry_budget.is_none()
    }
}

/// 任务查询过滤条件，结果按 `created_at` 倒序
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub task_type: Option<String>,
    pub status: Option<TaskStatus>,
    pub limit: Option<i64>,
}

impl Task {
    /// 创建新的待处理任务
    pub fn new(task_type: impl Into<String>, payload: Value, retry_budget: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            task_type: task_type.into(),
            payload,
            status: TaskStatus::Pending,
            retry_budget,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            duration: None,
            worker_id: None,
            version: 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 校验一次状态写入并生成对应的仓储补丁
    ///
    /// 终止状态的任务拒绝一切后续写入；结果与错误信息在终止状态下恰有其一，
    /// 非终止状态下都不存在。已被认领的任务只接受认领Worker的写入，
    /// 过期认领的旧持有者因此无法覆盖重新投递后的处理。
    pub fn apply(&self, update: &TaskStatusUpdate) -> TaskHubResult<TaskPatch> {
        if self.is_terminal() {
            return Err(TaskHubError::TerminalTask {
                id: self.id.clone(),
                status: self.status,
            });
        }

        if let Some(owner) = &self.worker_id {
            if update.worker_id.as_deref() != Some(owner.as_str()) {
                return Err(TaskHubError::ClaimMismatch {
                    id: self.id.clone(),
                    owner: owner.clone(),
                    claimant: update.worker_id.clone(),
                });
            }
        }

        let target = update.status.unwrap_or(self.status);
        if target != self.status && !self.status.can_transition_to(target) {
            return Err(TaskHubError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: target,
            });
        }

        match target {
            TaskStatus::Completed => {
                if update.result.is_none() {
                    return Err(TaskHubError::InconsistentUpdate(
                        "completed状态必须携带result".to_string(),
                    ));
                }
                if update.error_message.is_some() {
                    return Err(TaskHubError::InconsistentUpdate(
                        "completed状态不能携带error_message".to_string(),
                    ));
                }
            }
            TaskStatus::Failed => {
                if update.error_message.is_none() {
                    return Err(TaskHubError::InconsistentUpdate(
                        "failed状态必须携带error_message".to_string(),
                    ));
                }
                if update.result.is_some() {
                    return Err(TaskHubError::InconsistentUpdate(
                        "failed状态不能携带result".to_string(),
                    ));
                }
            }
            TaskStatus::Pending | TaskStatus::Processing => {
                if update.result.is_some()
                    || update.error_message.is_some()
                    || update.duration.is_some()
                {
                    return Err(TaskHubError::InconsistentUpdate(format!(
                        "{target}状态不能携带result、error_message或duration"
                    )));
                }
            }
        }

        if let Some(duration) = update.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(TaskHubError::InconsistentUpdate(format!(
                    "无效的duration: {duration}"
                )));
            }
        }

        if let Some(budget) = update.retry_budget {
            if budget < 0 {
                return Err(TaskHubError::InconsistentUpdate(
                    "retry_budget不能为负数".to_string(),
                ));
            }
            if budget > self.retry_budget {
                return Err(TaskHubError::InconsistentUpdate(format!(
                    "retry_budget只能递减: 当前 {}，请求 {budget}",
                    self.retry_budget
                )));
            }
        }

        let claim = (self.status == TaskStatus::Pending && target == TaskStatus::Processing)
            .then(|| update.worker_id.clone())
            .flatten();

        Ok(TaskPatch {
            status: update.status,
            result: update.result.clone(),
            error_message: update.error_message.clone(),
            duration: update.duration,
            retry_budget: update.retry_budget,
            worker_id: claim,
            expected_version: Some(self.version),
        })
    }
}
