pub mod notifier;
pub mod repository;
pub mod transport;

pub use notifier::{NotificationMessage, NotificationSender};
pub use repository::{
    HostRepository, SettingRepository, TaskHostRepository, TaskLogRepository, TaskRepository,
};
pub use transport::{CommandTransport, ExecutionOutput, HttpTransport};
