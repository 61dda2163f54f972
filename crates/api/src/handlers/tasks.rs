use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use taskhub_core::models::{NewTask, Task, TaskFilter, TaskStatus, TaskStatusUpdate};

use crate::{
    error::ApiResult,
    response::{Ack, SubmitTaskResponse, TasksResponse},
    routes::AppState,
};

/// 任务查询参数
#[derive(Debug, Deserialize)]
pub struct TaskQueryParams {
    pub task_type: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// 提交任务
pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitTaskResponse>)> {
    let Json(request) = payload?;
    let task = state.dispatcher.submit_task(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitTaskResponse { task_id: task.id }),
    ))
}

/// 获取任务列表
pub async fn list_tasks(
    State(state): State<AppState>,
    params: Result<Query<TaskQueryParams>, QueryRejection>,
) -> ApiResult<Json<TasksResponse>> {
    let Query(params) = params?;
    let status = params
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()?;

    let filter = TaskFilter {
        task_type: params.task_type,
        status,
        limit: params.limit,
    };
    let tasks = state.dispatcher.list_tasks(&filter).await?;

    Ok(Json(TasksResponse {
        total: tasks.len(),
        tasks,
    }))
}

/// 获取单个任务
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.dispatcher.get_task(&id).await?))
}

/// Worker上报任务状态
pub async fn update_task(
    State(state): State<AppState>,
    payload: Result<Json<TaskStatusUpdate>, JsonRejection>,
) -> ApiResult<Json<Ack>> {
    let Json(update) = payload?;
    state.dispatcher.update_task_status(update).await?;
    Ok(Json(Ack::new("Task updated")))
}
