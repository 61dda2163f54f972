//! 本机能力快照
//!
//! 注册时上报静态信息，心跳时只上报可用内存。读取失败时回退为0，不影响Worker启动。

use taskhub_core::models::WorkerRegistration;
use uuid::Uuid;

/// GPU描述从环境变量读取
pub const GPU_INFO_ENV: &str = "TASKHUB_GPU_INFO";

#[derive(Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    pub platform: String,
    pub cpu_count: i32,
    pub cpu_freq: f64,
    pub memory_total: i64,
    pub memory_available: i64,
    pub gpu_info: Option<String>,
}

impl SystemSnapshot {
    pub fn collect() -> Self {
        let (memory_total, memory_available) = read_meminfo();
        Self {
            platform: platform(),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get() as i32)
                .unwrap_or(1),
            cpu_freq: cpu_freq_mhz(),
            memory_total,
            memory_available,
            gpu_info: std::env::var(GPU_INFO_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn registration(&self, worker_id: &str) -> WorkerRegistration {
        WorkerRegistration {
            worker_id: worker_id.to_string(),
            platform: self.platform.clone(),
            memory_total: self.memory_total,
            memory_available: self.memory_available,
            cpu_count: self.cpu_count,
            cpu_freq: self.cpu_freq,
            gpu_info: self.gpu_info.clone(),
        }
    }
}

/// 当前可用内存（字节）
pub fn memory_available() -> i64 {
    read_meminfo().1
}

/// 未配置Worker ID时生成 `<hostname>-<随机后缀>`
pub fn generate_worker_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "worker".to_string());
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", host, &suffix[..8])
}

fn platform() -> String {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    match std::fs::read_to_string("/proc/sys/kernel/osrelease") {
        Ok(release) if !release.trim().is_empty() => {
            format!("{}-{}-{}", os, release.trim(), arch)
        }
        _ => format!("{os}-{arch}"),
    }
}

fn read_meminfo() -> (i64, i64) {
    std::fs::read_to_string("/proc/meminfo")
        .map(|content| parse_meminfo(&content))
        .unwrap_or((0, 0))
}

fn parse_meminfo(content: &str) -> (i64, i64) {
    let mut total = 0;
    let mut available = 0;
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next();
        let kb = parts.next().and_then(|v| v.parse::<i64>().ok());
        match (key, kb) {
            (Some("MemTotal:"), Some(kb)) => total = kb * 1024,
            (Some("MemAvailable:"), Some(kb)) => available = kb * 1024,
            _ => {}
        }
    }
    (total, available)
}

fn cpu_freq_mhz() -> f64 {
    std::fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|content| parse_cpu_mhz(&content))
        .unwrap_or(0.0)
}

fn parse_cpu_mhz(content: &str) -> Option<f64> {
    content
        .lines()
        .find(|line| line.starts_with("cpu MHz"))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|value| value.trim().parse::<f64>().ok())
}
