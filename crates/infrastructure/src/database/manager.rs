use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use taskhub_core::config::models::DatabaseConfig;
use taskhub_core::traits::{TaskRepository, WorkerRepository};
use taskhub_core::TaskHubResult;
use tracing::{debug, info};

use super::sqlite::{SqliteTaskRepository, SqliteWorkerRepository};

/// 数据库管理器
///
/// 持有连接池并负责建表，仓储通过工厂方法取得。
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.url.contains(":memory:") || config.url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("无效的数据库URL: {}", config.url))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.connection_timeout_seconds));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // 每个内存数据库连接都是独立的库，只能用单连接
        let max_connections = if in_memory { 1 } else { config.max_connections };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(config.min_connections.min(max_connections))
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(if in_memory {
                None
            } else {
                Some(Duration::from_secs(config.idle_timeout_seconds))
            })
            .max_lifetime(if in_memory {
                None
            } else {
                Some(Duration::from_secs(1800))
            })
            .connect_with(options)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.url))?;

        info!("数据库连接池已创建: {}", config.url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        run_migrations(&self.pool)
            .await
            .context("数据库迁移失败")?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn task_repository(&self) -> Arc<dyn TaskRepository> {
        Arc::new(SqliteTaskRepository::new(self.pool.clone()))
    }

    pub fn worker_repository(&self) -> Arc<dyn WorkerRepository> {
        Arc::new(SqliteWorkerRepository::new(self.pool.clone()))
    }
}

/// 建表，可重复执行
pub async fn run_migrations(pool: &SqlitePool) -> TaskHubResult<()> {
    debug!("Running SQLite database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            task_type TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT 'null',
            status TEXT NOT NULL DEFAULT 'pending',
            retry_budget INTEGER NOT NULL DEFAULT 3,
            result TEXT,
            error_message TEXT,
            duration REAL,
            worker_id TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            cpu_count INTEGER NOT NULL,
            cpu_freq REAL NOT NULL DEFAULT 0,
            memory_total INTEGER NOT NULL,
            memory_available INTEGER NOT NULL,
            gpu_info TEXT,
            registered_at TEXT NOT NULL,
            last_heartbeat_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_tasks_type ON tasks(task_type)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_workers_heartbeat ON workers(last_heartbeat_at)",
    ];
    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("SQLite database migrations completed");
    Ok(())
}
