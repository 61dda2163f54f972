use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state
        .dispatcher
        .health_check()
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    Ok(Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "taskhub",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// Prometheus文本格式的指标
pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let handle = state.metrics.as_ref().ok_or(ApiError::NotFound)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
