pub mod host;
pub mod setting;
pub mod task;
pub mod task_log;

pub use host::{Host, TaskHost};
pub use setting::Setting;
pub use task::{
    decode_id_list, encode_id_list, DependencyStatus, Multiplicity, NotifyChannel, NotifyStatus,
    Task, TaskFilter, TaskHttpMethod, TaskLevel, TaskProtocol, TaskStatus,
};
pub use task_log::{TaskLog, TaskLogFilter, TaskLogStatus};
