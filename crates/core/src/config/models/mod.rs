pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod dispatcher_worker;
pub mod queue;

pub use api_observability::{ApiConfig, LogFormat, ObservabilityConfig};
pub use app_config::{AppConfig, ENV_PREFIX};
pub use database::DatabaseConfig;
pub use dispatcher_worker::{
    BackoffStrategy, DispatcherConfig, ExecutionBackoffConfig, WorkerConfig,
};
pub use queue::{QueueConfig, QueueType, RedisConfig};
