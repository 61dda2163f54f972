//! 数据仓储层接口定义
//!
//! - [`TaskRepository`] - 任务记录的持久化
//! - [`WorkerRepository`] - Worker注册表的持久化
//!
//! 仓储只负责单行读写，不校验跨字段约束；状态机校验由
//! [`Task::apply`](crate::models::Task::apply) 在调用方完成。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::TaskHubResult;
use crate::models::{Task, TaskFilter, TaskPatch, WorkerHeartbeat, WorkerInfo, WorkerRegistration};

/// 任务仓储接口
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 保存新任务，返回存储后的记录
    async fn create(&self, task: &Task) -> TaskHubResult<Task>;

    /// 按ID查询任务，不存在时返回 `None`
    async fn get_by_id(&self, id: &str) -> TaskHubResult<Option<Task>>;

    /// 按过滤条件列出任务，按 `created_at` 倒序
    async fn list(&self, filter: &TaskFilter) -> TaskHubResult<Vec<Task>>;

    /// 写入部分字段
    ///
    /// `updated_at` 和 `version` 总会被刷新。补丁带有 `expected_version` 时，
    /// 仅在当前版本匹配时写入，否则返回 `VersionConflict`；任务不存在时
    /// 返回 `TaskNotFound`。
    async fn update(&self, id: &str, patch: &TaskPatch) -> TaskHubResult<Task>;
}

/// Worker仓储接口
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// 注册或重新注册Worker
    ///
    /// 重新注册覆盖静态能力快照并刷新心跳时间，保留首次的 `registered_at`。
    async fn upsert(&self, registration: &WorkerRegistration) -> TaskHubResult<WorkerInfo>;

    /// 记录心跳，只修改 `memory_available` 和 `last_heartbeat_at`
    async fn record_heartbeat(
        &self,
        heartbeat: &WorkerHeartbeat,
        at: DateTime<Utc>,
    ) -> TaskHubResult<WorkerInfo>;

    async fn get_by_id(&self, worker_id: &str) -> TaskHubResult<Option<WorkerInfo>>;

    /// 列出全部Worker，包括已失联的
    async fn list(&self) -> TaskHubResult<Vec<WorkerInfo>>;
}
