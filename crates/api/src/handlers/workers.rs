use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use taskhub_core::models::{WorkerHeartbeat, WorkerRegistration};

use crate::{
    error::ApiResult,
    response::{Ack, WorkersResponse},
    routes::AppState,
};

/// 注册或重新注册Worker
pub async fn register_worker(
    State(state): State<AppState>,
    payload: Result<Json<WorkerRegistration>, JsonRejection>,
) -> ApiResult<Json<Ack>> {
    let Json(registration) = payload?;
    state.dispatcher.register_worker(registration).await?;
    Ok(Json(Ack::new("Worker registered or updated")))
}

/// Worker心跳
pub async fn update_worker(
    State(state): State<AppState>,
    payload: Result<Json<WorkerHeartbeat>, JsonRejection>,
) -> ApiResult<Json<Ack>> {
    let Json(heartbeat) = payload?;
    state.dispatcher.record_heartbeat(heartbeat).await?;
    Ok(Json(Ack::new("Worker updated")))
}

pub async fn list_workers(State(state): State<AppState>) -> ApiResult<Json<WorkersResponse>> {
    let workers = state.dispatcher.list_workers().await?;
    Ok(Json(WorkersResponse { workers }))
}
