//! 任务分发系统核心库
//!
//! 包含错误类型、数据模型与任务状态机、仓储/队列/执行器接口、
//! 重试策略以及配置模型。

pub mod config;
pub mod errors;
pub mod models;
pub mod retry;
pub mod traits;

pub use config::{
    ApiConfig, AppConfig, DatabaseConfig, DispatcherConfig, ObservabilityConfig, QueueConfig,
    QueueType, WorkerConfig,
};
pub use errors::*;
pub use models::*;
pub use retry::{Backoff, RetryPolicy};
pub use traits::*;
