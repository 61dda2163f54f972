use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::DispatcherService;

/// 周期性回收超时未确认的队列认领
pub struct ClaimReaper {
    service: Arc<DispatcherService>,
    interval: Duration,
}

impl ClaimReaper {
    pub fn new(service: Arc<DispatcherService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// 运行直到收到关闭信号
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "认领回收任务已启动，间隔 {:?}，可见性超时 {:?}",
            self.interval,
            self.service.visibility_timeout()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.service.reclaim_expired().await {
                        error!("回收超时认领失败: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("认领回收任务已停止");
                    break;
                }
            }
        }
    }
}
