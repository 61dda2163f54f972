pub mod database;
pub mod in_memory_queue;
pub mod redis_queue;
pub mod task_queue_factory;

pub use database::*;
pub use in_memory_queue::InMemoryTaskQueue;
pub use redis_queue::RedisTaskQueue;
pub use task_queue_factory::TaskQueueFactory;
