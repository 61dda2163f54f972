pub mod manager;
pub mod sqlite;

pub use manager::{run_migrations, DatabaseManager};
pub use sqlite::{SqliteTaskRepository, SqliteWorkerRepository};
