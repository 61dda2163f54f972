use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use taskhub_core::ApiConfig;
use taskhub_dispatcher::DispatcherService;

use crate::handlers::{
    health::{health_check, metrics},
    queue::{next_task, queue_length},
    tasks::{create_task, get_task, list_tasks, update_task},
    workers::{list_workers, register_worker, update_worker},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<DispatcherService>,
    pub config: Arc<ApiConfig>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(dispatcher: Arc<DispatcherService>, config: ApiConfig) -> Self {
        Self {
            dispatcher,
            config: Arc::new(config),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        // 任务提交与查询
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", get(get_task))
        // Worker内部接口
        .route("/api/update_task", post(update_task))
        .route("/api/register_worker", post(register_worker))
        .route("/api/update_worker", post(update_worker))
        .route("/api/workers", get(list_workers))
        // 队列
        .route("/api/next_task", get(next_task))
        .route("/api/queue/length", get(queue_length))
        .with_state(state)
}
