//! Worker进程
//!
//! 向分发服务注册本机能力，后台发送心跳，循环拉取任务并按状态机执行。

pub mod components;
pub mod executors;
pub mod system_info;

use std::sync::Arc;

use taskhub_core::traits::ExecutorRegistry;

pub use components::{
    DispatcherClient, DispatcherGateway, ExecutionOutcome, HeartbeatManager, TaskExecutionManager,
    WorkerLifecycle, START_FAILED_MESSAGE,
};
pub use executors::{EchoExecutor, ShellExecutor, ShellTaskParams};
pub use system_info::{generate_worker_id, SystemSnapshot};

/// 内置执行器
pub fn default_executors() -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(EchoExecutor));
    registry.register(Arc::new(ShellExecutor));
    registry
}
