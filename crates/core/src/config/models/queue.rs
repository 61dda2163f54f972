use serde::{Deserialize, Serialize};

/// 队列实现类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueType {
    #[default]
    Memory,
    Redis,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub connection_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connection_timeout_seconds: 5,
        }
    }
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Redis主机地址不能为空"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("Redis端口必须大于0"));
        }

        if self.database < 0 {
            return Err(anyhow::anyhow!("Redis数据库索引不能为负数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Redis连接超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 任务队列配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    #[serde(rename = "type")]
    pub queue_type: QueueType,
    pub redis: RedisConfig,
    /// Redis键前缀
    pub key_prefix: String,
    /// 已认领条目未确认时重新投递的等待时间
    pub visibility_timeout_seconds: u64,
    pub reaper_interval_seconds: u64,
    /// 未指定任务类型时扫描的分区，按优先级排列
    pub default_partitions: Vec<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_type: QueueType::Memory,
            redis: RedisConfig::default(),
            key_prefix: "taskhub".to_string(),
            visibility_timeout_seconds: 120,
            reaper_interval_seconds: 10,
            default_partitions: vec!["test".to_string(), "whisper".to_string()],
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue_type == QueueType::Redis {
            self.redis.validate()?;
        }

        if self.key_prefix.is_empty() {
            return Err(anyhow::anyhow!("队列键前缀不能为空"));
        }

        if self.visibility_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("可见性超时必须大于0"));
        }

        if self.reaper_interval_seconds == 0 {
            return Err(anyhow::anyhow!("回收间隔必须大于0"));
        }

        if self.default_partitions.is_empty() {
            return Err(anyhow::anyhow!("默认分区不能为空"));
        }

        if self.default_partitions.iter().any(|p| p.trim().is_empty()) {
            return Err(anyhow::anyhow!("分区名不能为空"));
        }

        Ok(())
    }
}
