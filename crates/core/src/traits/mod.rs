pub mod repository;
pub mod task_executor;
pub mod task_queue;

pub use repository::*;
pub use task_executor::*;
pub use task_queue::*;
