use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use taskhub_core::{
    models::{Task, TaskFilter, TaskPatch},
    traits::TaskRepository,
    TaskHubError, TaskHubResult,
};
use tracing::debug;

const TASK_COLUMNS: &str = "id, task_type, payload, status, retry_budget, result, error_message, duration, worker_id, version, created_at, updated_at";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> TaskHubResult<Task> {
        let payload: String = row.try_get("payload")?;
        let result: Option<String> = row.try_get("result")?;

        Ok(Task {
            id: row.try_get("id")?,
            task_type: row.try_get("task_type")?,
            payload: serde_json::from_str(&payload)
                .map_err(|e| TaskHubError::Serialization(format!("解析任务payload失败: {e}")))?,
            status: row.try_get("status")?,
            retry_budget: row.try_get("retry_budget")?,
            result: result
                .map(|r| serde_json::from_str::<Value>(&r))
                .transpose()
                .map_err(|e| TaskHubError::Serialization(format!("解析任务结果失败: {e}")))?,
            error_message: row.try_get("error_message")?,
            duration: row.try_get("duration")?,
            worker_id: row.try_get("worker_id")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> TaskHubResult<Task> {
        let payload = serde_json::to_string(&task.payload)?;
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;

        let sql = format!(
            r#"
            INSERT INTO tasks ({TASK_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&task.id)
            .bind(&task.task_type)
            .bind(payload)
            .bind(task.status)
            .bind(task.retry_budget)
            .bind(result)
            .bind(&task.error_message)
            .bind(task.duration)
            .bind(&task.worker_id)
            .bind(task.version)
            .bind(task.created_at)
            .bind(task.updated_at)
            .fetch_one(&self.pool)
            .await?;

        let created = Self::row_to_task(&row)?;
        debug!("创建任务成功: {} ({})", created.id, created.task_type);
        Ok(created)
    }

    async fn get_by_id(&self, id: &str) -> TaskHubResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list(&self, filter: &TaskFilter) -> TaskHubResult<Vec<Task>> {
        let sql = format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE (?1 IS NULL OR task_type = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&filter.task_type)
            .bind(filter.status)
            .bind(filter.limit.unwrap_or(-1))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> TaskHubResult<Task> {
        let result = patch.result.as_ref().map(serde_json::to_string).transpose()?;

        let sql = format!(
            r#"
            UPDATE tasks SET
                status = COALESCE(?1, status),
                result = COALESCE(?2, result),
                error_message = COALESCE(?3, error_message),
                duration = COALESCE(?4, duration),
                retry_budget = COALESCE(?5, retry_budget),
                worker_id = COALESCE(?6, worker_id),
                updated_at = ?7,
                version = version + 1
            WHERE id = ?8 AND (?9 IS NULL OR version = ?9)
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(patch.status)
            .bind(result)
            .bind(&patch.error_message)
            .bind(patch.duration)
            .bind(patch.retry_budget)
            .bind(&patch.worker_id)
            .bind(Utc::now())
            .bind(id)
            .bind(patch.expected_version)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let task = Self::row_to_task(&row)?;
                debug!(
                    "更新任务成功: {} status={} version={}",
                    task.id, task.status, task.version
                );
                Ok(task)
            }
            None => match (self.get_by_id(id).await?, patch.expected_version) {
                (None, _) => Err(TaskHubError::TaskNotFound { id: id.to_string() }),
                (Some(_), Some(expected)) => Err(TaskHubError::VersionConflict {
                    id: id.to_string(),
                    expected,
                }),
                (Some(_), None) => Err(TaskHubError::DatabaseOperation(format!(
                    "更新任务 {id} 未影响任何行"
                ))),
            },
        }
    }
}
