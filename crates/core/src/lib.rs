pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use crate::config::AppConfig;
pub use errors::{SchedulerError, SchedulerResult};
pub use models::{Task, TaskHost, TaskLog, TaskLogStatus, TaskStatus};
