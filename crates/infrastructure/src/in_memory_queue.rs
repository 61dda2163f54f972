use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use taskhub_core::models::QueueEntry;
use taskhub_core::traits::TaskQueue;
use taskhub_core::TaskHubResult;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info};

/// 内存任务队列实现
///
/// 每个分区一个 `VecDeque`，取出的条目移入认领表直到确认。
/// 适用于单进程部署（`--mode all`）和测试。
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
    /// 有新条目入队时唤醒等待中的 `pop`
    notify: Notify,
}

#[derive(Debug, Default)]
struct QueueState {
    partitions: HashMap<String, VecDeque<QueueEntry>>,
    claims: HashMap<String, Claim>,
    next_claim_seq: u64,
}

#[derive(Debug)]
struct Claim {
    partition: String,
    entry: QueueEntry,
    claimed_at: Instant,
    seq: u64,
}

impl QueueState {
    fn take_first(&mut self, partitions: &[String]) -> Option<QueueEntry> {
        for partition in partitions {
            let Some(entry) = self
                .partitions
                .get_mut(partition)
                .and_then(|queue| queue.pop_front())
            else {
                continue;
            };

            self.next_claim_seq += 1;
            self.claims.insert(
                entry.task_id.clone(),
                Claim {
                    partition: partition.clone(),
                    entry: entry.clone(),
                    claimed_at: Instant::now(),
                    seq: self.next_claim_seq,
                },
            );
            return Some(entry);
        }
        None
    }
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn push(&self, partition: &str, entry: &QueueEntry) -> TaskHubResult<()> {
        {
            let mut state = self.state.lock().await;
            state
                .partitions
                .entry(partition.to_string())
                .or_default()
                .push_back(entry.clone());
        }
        self.notify.notify_waiters();
        debug!("任务 {} 已入队到分区 {}", entry.task_id, partition);
        Ok(())
    }

    async fn pop(
        &self,
        partitions: &[String],
        timeout: Duration,
    ) -> TaskHubResult<Option<QueueEntry>> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);

        loop {
            // 先登记唤醒再检查队列，避免检查后、等待前的入队被错过
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.state.lock().await.take_first(partitions) {
                return Ok(Some(entry));
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => return Ok(None),
                    }
                }
            }
        }
    }

    async fn ack(&self, task_id: &str) -> TaskHubResult<bool> {
        Ok(self.state.lock().await.claims.remove(task_id).is_some())
    }

    async fn requeue_expired(&self, visibility_timeout: Duration) -> TaskHubResult<usize> {
        let requeued = {
            let mut state = self.state.lock().await;
            let expired_ids: Vec<String> = state
                .claims
                .iter()
                .filter(|(_, claim)| claim.claimed_at.elapsed() >= visibility_timeout)
                .map(|(task_id, _)| task_id.clone())
                .collect();

            let mut expired: Vec<Claim> = expired_ids
                .iter()
                .filter_map(|task_id| state.claims.remove(task_id))
                .collect();
            // 最早认领的条目最后放回，保证它排在分区最前面
            expired.sort_by(|a, b| b.seq.cmp(&a.seq));

            let count = expired.len();
            for claim in expired {
                state
                    .partitions
                    .entry(claim.partition)
                    .or_default()
                    .push_front(claim.entry);
            }
            count
        };

        if requeued > 0 {
            self.notify.notify_waiters();
            info!("{} 个超时未确认的任务已重新入队", requeued);
        }
        Ok(requeued)
    }

    async fn len(&self, partition: &str) -> TaskHubResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .partitions
            .get(partition)
            .map_or(0, |queue| queue.len() as u64))
    }

    async fn in_flight(&self) -> TaskHubResult<u64> {
        Ok(self.state.lock().await.claims.len() as u64)
    }
}
