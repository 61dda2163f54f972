use std::time::Duration;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    error::ApiResult,
    response::{NextTaskResponse, QueueLengthResponse},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct NextTaskParams {
    /// 逗号分隔的分区列表，按顺序检查
    pub task_type: Option<String>,
    /// 阻塞秒数，0表示一直等待
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct QueueLengthParams {
    pub task_type: Option<String>,
}

fn parse_partitions(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// 拉取下一个任务，队列为空时阻塞直到超时
pub async fn next_task(
    State(state): State<AppState>,
    params: Result<Query<NextTaskParams>, QueryRejection>,
) -> ApiResult<Json<NextTaskResponse>> {
    let Query(params) = params?;
    let partitions = parse_partitions(params.task_type.as_deref());
    let timeout = Duration::from_secs(
        params
            .timeout
            .unwrap_or(state.config.next_task_timeout_seconds),
    );

    let task = state.dispatcher.next_task(&partitions, timeout).await?;
    Ok(Json(NextTaskResponse { task }))
}

/// 指定分区的队列长度；未指定时返回全部默认分区
pub async fn queue_length(
    State(state): State<AppState>,
    params: Result<Query<QueueLengthParams>, QueryRejection>,
) -> ApiResult<Json<QueueLengthResponse>> {
    let Query(params) = params?;
    let response = match params.task_type.as_deref().map(str::trim) {
        Some(task_type) if !task_type.is_empty() => QueueLengthResponse::Single {
            length: state.dispatcher.queue_length(task_type).await?,
        },
        _ => QueueLengthResponse::All {
            lengths: state.dispatcher.queue_lengths().await?,
        },
    };
    Ok(Json(response))
}
