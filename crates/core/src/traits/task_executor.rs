//! 任务执行器接口定义
//!
//! 执行器是Worker实际运行任务的组件，按任务类型注册到 [`ExecutorRegistry`]。
//! 执行器只负责一次尝试；重试由Worker的执行状态机按任务的重试预算完成。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::TaskHubResult;

/// 单次执行尝试的上下文
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub task_id: String,
    pub task_type: String,
    pub payload: Value,
    pub worker_id: String,
    /// 从1开始的尝试序号
    pub attempt: u32,
    /// Worker开始处理该任务的时刻，跨尝试不变
    pub started_at: Instant,
}

/// 任务执行器接口
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// 执行器负责的任务类型
    fn task_type(&self) -> &str;

    /// 执行一次，成功返回结果JSON
    async fn execute(&self, context: &ExecutionContext) -> TaskHubResult<Value>;
}

/// 执行器注册表
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册执行器，同类型的旧执行器会被替换
    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executors
            .insert(executor.task_type().to_string(), executor);
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(task_type).cloned()
    }

    /// 已注册的任务类型，按字母排序
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}
