//! 任务分发服务
//!
//! [`DispatcherService`] 组合任务仓储、Worker仓储和任务队列，
//! [`ClaimReaper`] 在后台把超时未确认的队列条目重新投递。

pub mod claim_reaper;
pub mod service;

pub use claim_reaper::ClaimReaper;
pub use service::{DispatcherService, ENQUEUE_FAILED_MESSAGE};
