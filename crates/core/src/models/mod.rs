//! # 数据模型
//!
//! 任务分发系统的核心数据结构。
//!
//! - [`Task`] - 任务记录及其状态机
//! - [`WorkerInfo`] - Worker注册信息与心跳
//! - [`QueueEntry`] - 按任务类型分区的队列条目
//!
//! ## 任务状态流转
//! ```text
//! pending → processing → completed
//!    │           │
//!    └───────────┴──────→ failed
//! ```
//!
//! 所有时间字段使用 `DateTime<Utc>`。

pub mod queue;
pub mod task;
pub mod worker;

pub use queue::*;
pub use task::*;
pub use worker::*;
