use std::sync::Arc;
use std::time::Duration;

use taskhub_core::{
    models::{WorkerHeartbeat, WorkerRegistration},
    TaskHubResult,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::DispatcherGateway;

/// 读取当前可用内存（字节）
pub type MemoryProbe = Arc<dyn Fn() -> i64 + Send + Sync>;

/// 周期性上报可用内存
///
/// 单次心跳失败只记录日志，不影响后续心跳和任务拉取。分发服务返回404
/// （例如数据库被重建）时用注册信息重新注册。
pub struct HeartbeatManager {
    worker_id: String,
    gateway: Arc<dyn DispatcherGateway>,
    interval: Duration,
    memory_probe: MemoryProbe,
}

impl HeartbeatManager {
    pub fn new(
        worker_id: String,
        gateway: Arc<dyn DispatcherGateway>,
        interval: Duration,
        memory_probe: MemoryProbe,
    ) -> Self {
        Self {
            worker_id,
            gateway,
            interval,
            memory_probe,
        }
    }

    pub async fn send_heartbeat(&self) -> TaskHubResult<()> {
        let heartbeat = WorkerHeartbeat {
            worker_id: self.worker_id.clone(),
            memory_available: (self.memory_probe)(),
        };
        self.gateway.heartbeat(&heartbeat).await?;
        debug!(
            "Worker {} 心跳已发送 (可用内存: {})",
            self.worker_id, heartbeat.memory_available
        );
        Ok(())
    }

    /// 发送一次心跳；Worker未被识别时重新注册
    pub async fn tick(&self, registration: &mut WorkerRegistration) {
        match self.send_heartbeat().await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!("Dispatcher未识别Worker {}，重新注册", self.worker_id);
                registration.memory_available = (self.memory_probe)();
                match self.gateway.register(registration).await {
                    Ok(()) => info!("Worker {} 重新注册成功", self.worker_id),
                    Err(e) => error!("Worker {} 重新注册失败: {}", self.worker_id, e),
                }
            }
            Err(e) => error!("Worker {} 发送心跳失败: {}", self.worker_id, e),
        }
    }

    /// 在后台启动心跳循环，收到关闭信号后退出
    pub fn start(
        self: Arc<Self>,
        mut registration: WorkerRegistration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick(&mut registration).await,
                    _ = shutdown_rx.recv() => {
                        info!("心跳任务已停止");
                        break;
                    }
                }
            }
        })
    }
}
