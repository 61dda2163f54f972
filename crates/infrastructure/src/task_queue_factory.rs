use std::sync::Arc;

use taskhub_core::config::models::{QueueConfig, QueueType};
use taskhub_core::traits::TaskQueue;
use taskhub_core::TaskHubResult;
use tracing::{debug, info};

use crate::{InMemoryTaskQueue, RedisTaskQueue};

pub struct TaskQueueFactory;

impl TaskQueueFactory {
    pub async fn create(config: &QueueConfig) -> TaskHubResult<Arc<dyn TaskQueue>> {
        debug!("Creating task queue with type: {:?}", config.queue_type);

        match config.queue_type {
            QueueType::Memory => {
                info!("Initializing in-memory task queue");
                Ok(Arc::new(InMemoryTaskQueue::new()))
            }
            QueueType::Redis => {
                info!(
                    "Initializing Redis task queue at {}:{}",
                    config.redis.host, config.redis.port
                );
                let queue = RedisTaskQueue::new(config).await?;
                Ok(Arc::new(queue))
            }
        }
    }
}
