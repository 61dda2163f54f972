//! 重试策略
//!
//! 传输类重试（状态上报、数据库写入）和执行重试共用同一个策略类型：
//! 前者由 [`RetryPolicy::retry`] 驱动，只重试可重试的错误；后者由Worker按
//! 任务的重试预算逐次调用执行器，使用 [`RetryPolicy::delay_for`] 计算间隔。

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::errors::TaskHubResult;

/// 两次尝试之间的等待策略
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// 固定间隔
    Fixed(Duration),
    /// 指数增长，封顶 `max`；`jitter` 打开时在 `[d/2, d]` 内随机
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, max: Duration, jitter: bool) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base, max, jitter },
        }
    }

    /// 相同间隔策略，替换尝试次数
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: self.backoff.clone(),
        }
    }

    /// 第 `attempt` 次尝试（从1开始）失败后的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential { base, max, jitter } => {
                let exponent = attempt.saturating_sub(1).min(31);
                let delay = base
                    .checked_mul(1u32 << exponent)
                    .map_or(*max, |d| d.min(*max));
                if *jitter && !delay.is_zero() {
                    let millis = delay.as_millis() as u64;
                    let jittered = rand::rng().random_range(millis / 2..=millis);
                    Duration::from_millis(jittered)
                } else {
                    delay
                }
            }
        }
    }

    /// 执行操作，遇到可重试错误时按策略等待后重试
    ///
    /// 不可重试的错误立即返回；尝试次数用尽时返回最后一次的错误。
    /// 闭包参数为从1开始的尝试序号。
    pub async fn retry<T, F, Fut>(&self, operation: &str, mut op: F) -> TaskHubResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = TaskHubResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} 第 {}/{} 次尝试失败: {}，{:?} 后重试",
                        operation, attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
