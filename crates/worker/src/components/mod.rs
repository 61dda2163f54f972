pub mod dispatcher_client;
pub mod heartbeat_manager;
pub mod task_execution;
pub mod worker_lifecycle;

pub use dispatcher_client::{DispatcherClient, DispatcherGateway};
pub use heartbeat_manager::HeartbeatManager;
pub use task_execution::{ExecutionOutcome, TaskExecutionManager, START_FAILED_MESSAGE};
pub use worker_lifecycle::WorkerLifecycle;
