//! 配置管理
//!
//! 配置按以下顺序叠加，后者覆盖前者：
//!
//! 1. 各配置段的默认值
//! 2. TOML配置文件
//! 3. `TASKHUB_` 前缀的环境变量，嵌套键用 `__` 分隔
//!
//! ```text
//! TASKHUB_QUEUE__TYPE=redis
//! TASKHUB_WORKER__TASK_TYPES=test,whisper
//! ```
//!
//! 每个配置段提供 `validate()`，加载完成后整体校验。

pub mod models;

pub use models::*;
