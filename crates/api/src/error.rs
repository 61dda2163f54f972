use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use taskhub_core::TaskHubError;
use tracing::error;

use crate::response::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    TaskHub(#[from] TaskHubError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,

    #[error("服务不可用: {0}")]
    Unavailable(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::TaskHub(err) => match err {
                TaskHubError::TaskNotFound { .. } => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
                TaskHubError::WorkerNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "WORKER_NOT_FOUND")
                }
                TaskHubError::TerminalTask { .. } => (StatusCode::CONFLICT, "TASK_TERMINAL"),
                TaskHubError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION")
                }
                TaskHubError::VersionConflict { .. } => (StatusCode::CONFLICT, "VERSION_CONFLICT"),
                TaskHubError::ClaimMismatch { .. } => (StatusCode::CONFLICT, "TASK_CLAIMED"),
                TaskHubError::InconsistentUpdate(_) => {
                    (StatusCode::BAD_REQUEST, "INCONSISTENT_UPDATE")
                }
                TaskHubError::InvalidTaskParams(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_PARAMS")
                }
                TaskHubError::Serialization(_) => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
                TaskHubError::Queue(_) => (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_UNAVAILABLE"),
                TaskHubError::Database(_) | TaskHubError::DatabaseOperation(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        (status, Json(ErrorBody::new(code, self.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
