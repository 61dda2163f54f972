use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use taskhub_core::{
    models::{WorkerHeartbeat, WorkerInfo, WorkerRegistration},
    traits::WorkerRepository,
    TaskHubError, TaskHubResult,
};
use tracing::debug;

const WORKER_COLUMNS: &str = "id, platform, cpu_count, cpu_freq, memory_total, memory_available, gpu_info, registered_at, last_heartbeat_at";

pub struct SqliteWorkerRepository {
    pool: SqlitePool,
}

impl SqliteWorkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_worker_info(row: &sqlx::sqlite::SqliteRow) -> TaskHubResult<WorkerInfo> {
        Ok(WorkerInfo {
            id: row.try_get("id")?,
            platform: row.try_get("platform")?,
            cpu_count: row.try_get("cpu_count")?,
            cpu_freq: row.try_get("cpu_freq")?,
            memory_total: row.try_get("memory_total")?,
            memory_available: row.try_get("memory_available")?,
            gpu_info: row.try_get("gpu_info")?,
            registered_at: row.try_get("registered_at")?,
            last_heartbeat_at: row.try_get("last_heartbeat_at")?,
        })
    }
}

#[async_trait]
impl WorkerRepository for SqliteWorkerRepository {
    async fn upsert(&self, registration: &WorkerRegistration) -> TaskHubResult<WorkerInfo> {
        let worker = WorkerInfo::new(registration.clone());

        let sql = format!(
            r#"
            INSERT INTO workers ({WORKER_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                platform = excluded.platform,
                cpu_count = excluded.cpu_count,
                cpu_freq = excluded.cpu_freq,
                memory_total = excluded.memory_total,
                memory_available = excluded.memory_available,
                gpu_info = excluded.gpu_info,
                last_heartbeat_at = excluded.last_heartbeat_at
            RETURNING {WORKER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&worker.id)
            .bind(&worker.platform)
            .bind(worker.cpu_count)
            .bind(worker.cpu_freq)
            .bind(worker.memory_total)
            .bind(worker.memory_available)
            .bind(&worker.gpu_info)
            .bind(worker.registered_at)
            .bind(worker.last_heartbeat_at)
            .fetch_one(&self.pool)
            .await?;

        debug!("注册Worker成功: {}", worker.id);
        Self::row_to_worker_info(&row)
    }

    async fn record_heartbeat(
        &self,
        heartbeat: &WorkerHeartbeat,
        at: DateTime<Utc>,
    ) -> TaskHubResult<WorkerInfo> {
        let sql = format!(
            r#"
            UPDATE workers
            SET memory_available = ?1, last_heartbeat_at = ?2
            WHERE id = ?3
            RETURNING {WORKER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(heartbeat.memory_available)
            .bind(at)
            .bind(&heartbeat.worker_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_worker_info(&row),
            None => Err(TaskHubError::WorkerNotFound {
                id: heartbeat.worker_id.clone(),
            }),
        }
    }

    async fn get_by_id(&self, worker_id: &str) -> TaskHubResult<Option<WorkerInfo>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_worker_info).transpose()
    }

    async fn list(&self) -> TaskHubResult<Vec<WorkerInfo>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers ORDER BY registered_at ASC, id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_worker_info).collect()
    }
}
