//! # TaskHub API
//!
//! 任务分发服务的HTTP接口，基于Axum构建。
//!
//! ## API 端点
//!
//! - `POST /api/tasks` - 提交任务，返回 `{task_id}`
//! - `GET /api/tasks` - 任务列表，支持 `task_type`、`status`、`limit` 过滤
//! - `GET /api/tasks/{id}` - 任务详情
//! - `POST /api/update_task` - Worker上报状态
//! - `POST /api/register_worker` - Worker注册
//! - `POST /api/update_worker` - Worker心跳
//! - `GET /api/workers` - Worker列表（含存活状态）
//! - `GET /api/next_task?task_type=a,b&timeout=N` - 阻塞拉取下一个任务
//! - `GET /api/queue/length` - 队列长度
//! - `GET /health`、`GET /metrics`
//!
//! 成功响应直接返回约定的JSON对象；错误响应统一为
//! `{"success": false, "error": {"code", "message"}}`。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState) -> Router {
    let cors = state.config.cors_enabled.then(|| cors_layer(&state.config));

    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}
