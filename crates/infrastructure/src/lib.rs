//! 基础设施层: SQLite存储、远程代理传输与通知渠道。

pub mod bootstrap;
pub mod database;
pub mod notifiers;
pub mod transport;

pub use bootstrap::repair_settings;
pub use database::sqlite::{
    connect, SqliteHostRepository, SqliteSettingRepository, SqliteTaskHostRepository,
    SqliteTaskLogRepository, SqliteTaskRepository,
};
pub use notifiers::{MailSender, SlackSender, WebhookSender};
pub use transport::{AgentTransport, HttpTaskTransport};
