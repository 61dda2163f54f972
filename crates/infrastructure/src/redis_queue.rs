use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use taskhub_core::config::models::QueueConfig;
use taskhub_core::models::QueueEntry;
use taskhub_core::traits::TaskQueue;
use taskhub_core::{TaskHubError, TaskHubResult};
use tokio::time::Instant;
use tracing::{debug, info};

/// 阻塞拉取时两次扫描之间的间隔
const POP_POLL_INTERVAL: Duration = Duration::from_millis(100);

// KEYS: claims, claim_times, (queue, processing) * N
// ARGV: now_ms, partition * N
const POP_SCRIPT: &str = r#"
for i = 3, #KEYS, 2 do
    local raw = redis.call('LMOVE', KEYS[i], KEYS[i + 1], 'LEFT', 'RIGHT')
    if raw then
        local entry = cjson.decode(raw)
        local partition = ARGV[(i - 1) / 2 + 1]
        redis.call('HSET', KEYS[1], entry.task_id, cjson.encode({partition = partition, entry = raw}))
        redis.call('ZADD', KEYS[2], ARGV[1], entry.task_id)
        return raw
    end
end
return false
"#;

// KEYS: claims, claim_times
// ARGV: task_id, key_prefix
const ACK_SCRIPT: &str = r#"
local claim = redis.call('HGET', KEYS[1], ARGV[1])
if not claim then
    return 0
end
local c = cjson.decode(claim)
redis.call('LREM', ARGV[2] .. ':processing:' .. c.partition, 1, c.entry)
redis.call('HDEL', KEYS[1], ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
return 1
"#;

// KEYS: claims, claim_times
// ARGV: cutoff_ms, key_prefix
const REQUEUE_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
local count = 0
for i = #ids, 1, -1 do
    local id = ids[i]
    local claim = redis.call('HGET', KEYS[1], id)
    if claim then
        local c = cjson.decode(claim)
        redis.call('LREM', ARGV[2] .. ':processing:' .. c.partition, 1, c.entry)
        redis.call('LPUSH', ARGV[2] .. ':queue:' .. c.partition, c.entry)
        count = count + 1
    end
    redis.call('HDEL', KEYS[1], id)
    redis.call('ZREM', KEYS[2], id)
end
return count
"#;

/// Redis任务队列实现
///
/// 键布局（`prefix` 为配置的键前缀）：
///
/// - `prefix:queue:<partition>` 等待中的条目，`RPUSH` 入队、从头部取出
/// - `prefix:processing:<partition>` 已认领的条目
/// - `prefix:claims` 认领记录，task_id → 分区与条目
/// - `prefix:claim_times` 认领时间（毫秒），用于找出超时的认领
///
/// 取出、确认和重新入队都由Lua脚本原子完成。每次调用单独获取连接。
pub struct RedisTaskQueue {
    client: Client,
    key_prefix: String,
    pop_script: Script,
    ack_script: Script,
    requeue_script: Script,
}

impl RedisTaskQueue {
    pub async fn new(config: &QueueConfig) -> TaskHubResult<Self> {
        let client = Client::open(config.redis.url()).map_err(|e| {
            TaskHubError::Queue(format!("Failed to create Redis client: {e}"))
        })?;

        let queue = Self {
            client,
            key_prefix: config.key_prefix.clone(),
            pop_script: Script::new(POP_SCRIPT),
            ack_script: Script::new(ACK_SCRIPT),
            requeue_script: Script::new(REQUEUE_SCRIPT),
        };
        queue.ping().await?;
        debug!(
            "Successfully connected to Redis at {}:{}",
            config.redis.host, config.redis.port
        );
        Ok(queue)
    }

    async fn connection(&self) -> TaskHubResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TaskHubError::Queue(format!("Failed to connect to Redis: {e}")))
    }

    pub async fn ping(&self) -> TaskHubResult<()> {
        let mut conn = self.connection().await?;
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;
        if response == "PONG" {
            Ok(())
        } else {
            Err(TaskHubError::Queue(format!(
                "Unexpected PING response: {response}"
            )))
        }
    }

    fn queue_key(&self, partition: &str) -> String {
        format!("{}:queue:{}", self.key_prefix, partition)
    }

    fn processing_key(&self, partition: &str) -> String {
        format!("{}:processing:{}", self.key_prefix, partition)
    }

    fn claims_key(&self) -> String {
        format!("{}:claims", self.key_prefix)
    }

    fn claim_times_key(&self) -> String {
        format!("{}:claim_times", self.key_prefix)
    }

    async fn try_pop(&self, partitions: &[String]) -> TaskHubResult<Option<QueueEntry>> {
        let mut invocation = self.pop_script.prepare_invoke();
        invocation
            .key(self.claims_key())
            .key(self.claim_times_key())
            .arg(Utc::now().timestamp_millis());
        for partition in partitions {
            invocation
                .key(self.queue_key(partition))
                .key(self.processing_key(partition))
                .arg(partition);
        }

        let mut conn = self.connection().await?;
        let raw: Option<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;

        raw.map(|raw| serde_json::from_str::<QueueEntry>(&raw))
            .transpose()
            .map_err(|e| TaskHubError::Serialization(format!("解析队列条目失败: {e}")))
    }
}

fn redis_error(e: redis::RedisError) -> TaskHubError {
    TaskHubError::Queue(format!("Redis command failed: {e}"))
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn push(&self, partition: &str, entry: &QueueEntry) -> TaskHubResult<()> {
        let raw = serde_json::to_string(entry)?;
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .rpush(self.queue_key(partition), raw)
            .await
            .map_err(redis_error)?;
        debug!("任务 {} 已入队到分区 {}", entry.task_id, partition);
        Ok(())
    }

    async fn pop(
        &self,
        partitions: &[String],
        timeout: Duration,
    ) -> TaskHubResult<Option<QueueEntry>> {
        if partitions.is_empty() {
            return Ok(None);
        }

        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        loop {
            if let Some(entry) = self.try_pop(partitions).await? {
                return Ok(Some(entry));
            }

            let wait = match deadline {
                None => POP_POLL_INTERVAL,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    remaining.min(POP_POLL_INTERVAL)
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    async fn ack(&self, task_id: &str) -> TaskHubResult<bool> {
        let mut conn = self.connection().await?;
        let acked: i64 = self
            .ack_script
            .key(self.claims_key())
            .key(self.claim_times_key())
            .arg(task_id)
            .arg(&self.key_prefix)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;
        Ok(acked == 1)
    }

    async fn requeue_expired(&self, visibility_timeout: Duration) -> TaskHubResult<usize> {
        let cutoff = Utc::now().timestamp_millis() - visibility_timeout.as_millis() as i64;
        let mut conn = self.connection().await?;
        let requeued: i64 = self
            .requeue_script
            .key(self.claims_key())
            .key(self.claim_times_key())
            .arg(cutoff)
            .arg(&self.key_prefix)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_error)?;

        if requeued > 0 {
            info!("{} 个超时未确认的任务已重新入队", requeued);
        }
        Ok(requeued as usize)
    }

    async fn len(&self, partition: &str) -> TaskHubResult<u64> {
        let mut conn = self.connection().await?;
        conn.llen(self.queue_key(partition))
            .await
            .map_err(redis_error)
    }

    async fn in_flight(&self) -> TaskHubResult<u64> {
        let mut conn = self.connection().await?;
        conn.hlen(self.claims_key()).await.map_err(redis_error)
    }
}
