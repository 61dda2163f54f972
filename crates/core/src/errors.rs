use thiserror::Error;

use crate::models::TaskStatus;

/// 任务分发系统错误类型定义
///
/// 按处理方式分为三类：
/// - 传输类错误（数据库、队列、网络）：可以有限次重试
/// - 执行类错误：由Worker按任务的重试预算重试
/// - 未找到/状态冲突类错误：直接返回给调用方，不重试
#[derive(Debug, Error)]
pub enum TaskHubError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },

    #[error("非法状态转换: 任务 {id} 不能从 {from} 转换到 {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("任务 {id} 已处于终止状态 {status}，拒绝后续更新")]
    TerminalTask { id: String, status: TaskStatus },

    #[error("任务 {id} 已被Worker {owner} 认领，拒绝来自 {claimant:?} 的写入")]
    ClaimMismatch {
        id: String,
        owner: String,
        claimant: Option<String>,
    },

    #[error("任务更新字段不一致: {0}")]
    InconsistentUpdate(String),

    #[error("版本冲突: 任务 {id} 期望版本 {expected}")]
    VersionConflict { id: String, expected: i64 },

    #[error("队列错误: {0}")]
    Queue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("{0}")]
    TaskExecution(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("HTTP错误: {status} - {body}")]
    Http { status: u16, body: String },

    #[error("不支持的任务类型: {0}")]
    UnsupportedTaskType(String),

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl TaskHubError {
    /// 是否为"资源不存在"类错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TaskHubError::TaskNotFound { .. } | TaskHubError::WorkerNotFound { .. }
        ) || matches!(self, TaskHubError::Http { status: 404, .. })
    }

    /// 是否为可重试的传输类错误
    ///
    /// 4xx响应表示请求本身被拒绝，重发不会改变结果。
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskHubError::Database(_)
            | TaskHubError::DatabaseOperation(_)
            | TaskHubError::Queue(_)
            | TaskHubError::Network(_) => true,
            TaskHubError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for TaskHubError {
    fn from(e: serde_json::Error) -> Self {
        TaskHubError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type TaskHubResult<T> = std::result::Result<T, TaskHubError>;
