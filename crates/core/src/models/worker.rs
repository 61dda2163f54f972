use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Worker节点信息
///
/// 注册时写入全部静态字段；心跳只刷新 `memory_available` 和 `last_heartbeat_at`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerInfo {
    pub id: String,
    pub platform: String,
    pub cpu_count: i32,
    pub cpu_freq: f64,
    pub memory_total: i64,
    pub memory_available: i64,
    pub gpu_info: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

/// Worker注册请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerRegistration {
    pub worker_id: String,
    pub platform: String,
    pub memory_total: i64,
    pub memory_available: i64,
    pub cpu_count: i32,
    #[serde(default)]
    pub cpu_freq: f64,
    #[serde(default)]
    pub gpu_info: Option<String>,
}

/// Worker心跳信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerHeartbeat {
    pub worker_id: String,
    pub memory_available: i64,
}

/// 对外展示的Worker信息，附带存活判断
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerView {
    #[serde(flatten)]
    pub worker: WorkerInfo,
    pub alive: bool,
}

impl WorkerInfo {
    /// 根据注册请求创建Worker信息
    pub fn new(registration: WorkerRegistration) -> Self {
        let now = Utc::now();
        Self {
            id: registration.worker_id,
            platform: registration.platform,
            cpu_count: registration.cpu_count,
            cpu_freq: registration.cpu_freq,
            memory_total: registration.memory_total,
            memory_available: registration.memory_available,
            gpu_info: registration.gpu_info,
            registered_at: now,
            last_heartbeat_at: now,
        }
    }

    /// 最近一次心跳是否在超时窗口内
    pub fn is_alive(&self, timeout_seconds: i64, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_heartbeat_at) <= Duration::seconds(timeout_seconds)
    }

    pub fn view(self, timeout_seconds: i64, now: DateTime<Utc>) -> WorkerView {
        let alive = self.is_alive(timeout_seconds, now);
        WorkerView {
            worker: self,
            alive,
        }
    }
}
