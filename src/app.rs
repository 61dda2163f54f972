use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use taskhub_api::{create_app, AppState};
use taskhub_core::AppConfig;
use taskhub_dispatcher::{ClaimReaper, DispatcherService};
use taskhub_infrastructure::{DatabaseManager, TaskQueueFactory};
use taskhub_worker::{
    default_executors, generate_worker_id, DispatcherClient, DispatcherGateway, WorkerLifecycle,
};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 分发服务和HTTP接口
    Api,
    /// 仅运行Worker
    Worker,
    /// 同一进程内运行分发服务和Worker
    All,
}

impl AppMode {
    pub fn runs_api(self) -> bool {
        matches!(self, AppMode::Api | AppMode::All)
    }

    pub fn runs_worker(self) -> bool {
        matches!(self, AppMode::Worker | AppMode::All)
    }
}

/// 分发服务端持有的资源
struct DispatcherRuntime {
    database: DatabaseManager,
    service: Arc<DispatcherService>,
    metrics: Option<PrometheusHandle>,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    dispatcher: Option<DispatcherRuntime>,
}

impl Application {
    /// 创建应用实例，API模式下完成数据库迁移和队列连接
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let dispatcher = if mode.runs_api() {
            Some(build_dispatcher(&config).await?)
        } else {
            None
        };

        Ok(Self {
            config,
            mode,
            dispatcher,
        })
    }

    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        match self.mode {
            AppMode::Api => self.run_api(shutdown_rx).await,
            AppMode::Worker => self.run_worker(shutdown_rx).await,
            AppMode::All => {
                let (api_result, worker_result) = tokio::join!(
                    self.run_api(shutdown_rx.resubscribe()),
                    self.run_worker(shutdown_rx)
                );
                if let Err(e) = &worker_result {
                    error!("Worker运行失败: {e:#}");
                }
                api_result.and(worker_result)
            }
        }
    }

    /// 运行分发服务：HTTP接口和认领回收任务
    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let runtime = self
            .dispatcher
            .as_ref()
            .context("分发服务未初始化")?;

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        let reaper_handle = {
            let reaper = ClaimReaper::new(
                Arc::clone(&runtime.service),
                Duration::from_secs(self.config.queue.reaper_interval_seconds),
            );
            let shutdown_rx = shutdown_rx.resubscribe();
            tokio::spawn(reaper.run(shutdown_rx))
        };

        let mut state = AppState::new(Arc::clone(&runtime.service), self.config.api.clone());
        if let Some(handle) = &runtime.metrics {
            state = state.with_metrics(handle.clone());
        }
        let app = create_app(state);

        let serve_result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败");

        if let Err(e) = reaper_handle.await {
            warn!("认领回收任务异常退出: {e}");
        }
        runtime.database.close().await;

        info!("API服务器已停止");
        serve_result
    }

    /// 运行Worker：注册、心跳、拉取任务
    async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let worker_config = &self.config.worker;
        let worker_id = worker_config
            .worker_id
            .clone()
            .unwrap_or_else(generate_worker_id);

        let client = DispatcherClient::new(
            &worker_config.dispatcher_url,
            Duration::from_secs(worker_config.request_timeout_seconds),
        )
        .context("创建Dispatcher客户端失败")?;
        info!(
            "启动Worker服务: {}，Dispatcher: {}",
            worker_id,
            client.base_url()
        );

        let lifecycle = WorkerLifecycle::new(
            worker_id,
            worker_config,
            Arc::new(client) as Arc<dyn DispatcherGateway>,
            default_executors(),
        );
        lifecycle.run(shutdown_rx).await;

        info!("Worker服务已停止: {}", lifecycle.worker_id());
        Ok(())
    }
}

async fn build_dispatcher(config: &AppConfig) -> Result<DispatcherRuntime> {
    let database = DatabaseManager::new(&config.database).await?;
    database.migrate().await?;

    let queue = TaskQueueFactory::create(&config.queue)
        .await
        .context("创建任务队列失败")?;

    let service = Arc::new(DispatcherService::new(
        database.task_repository(),
        database.worker_repository(),
        queue,
        config.dispatcher.clone(),
        config.queue.clone(),
    ));

    let metrics = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("安装Prometheus指标记录器失败")?;
        Some(handle)
    } else {
        None
    };

    Ok(DispatcherRuntime {
        database,
        service,
        metrics,
    })
}
