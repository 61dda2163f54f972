use std::time::Duration;

use async_trait::async_trait;

use crate::errors::TaskHubResult;
use crate::models::QueueEntry;

/// 按任务类型分区的任务队列
///
/// 同一分区内先进先出。被取走的条目先进入"已认领"状态，直到 `ack`；
/// 超过可见性超时仍未确认的条目由 `requeue_expired` 放回分区头部重新投递。
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 将条目追加到分区尾部
    async fn push(&self, partition: &str, entry: &QueueEntry) -> TaskHubResult<()>;

    /// 按列表顺序扫描分区，取出第一个可用条目
    ///
    /// `timeout` 为零时一直阻塞直到有条目可用，超时返回 `None`。
    /// future 被丢弃时不会丢失条目。
    async fn pop(&self, partitions: &[String], timeout: Duration)
        -> TaskHubResult<Option<QueueEntry>>;

    /// 确认条目已被处理方接收，返回是否存在对应的认领
    async fn ack(&self, task_id: &str) -> TaskHubResult<bool>;

    /// 把认领时间早于 `visibility_timeout` 的条目放回各自分区头部
    async fn requeue_expired(&self, visibility_timeout: Duration) -> TaskHubResult<usize>;

    /// 分区中等待中的条目数，不含已认领的
    async fn len(&self, partition: &str) -> TaskHubResult<u64>;

    /// 已认领但未确认的条目数
    async fn in_flight(&self) -> TaskHubResult<u64>;
}
